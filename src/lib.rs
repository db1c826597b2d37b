// Library exports for testing and reuse
pub mod config;
pub mod error;
pub mod models;
pub mod sandbox;
pub mod services;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, StoreError};
pub use sandbox::{SandboxAuthority, ScriptedPurchase};
pub use services::{StoreAuthority, StoreService};
