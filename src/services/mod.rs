// Service modules
pub mod authority;
pub mod clock;
pub mod store_service;
pub mod transaction_listener;

pub use authority::{StoreAuthority, TransactionStream};
pub use clock::{Clock, FixedClock, SystemClock};
pub use store_service::StoreService;
pub use transaction_listener::TransactionObserver;
