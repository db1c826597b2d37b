use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{
    error::Result,
    models::{
        product::Product,
        purchase::{PurchaseOption, PurchaseOutcome},
        transaction::{Transaction, VerificationResult},
    },
};

/// Stream of signed transactions delivered by the authority
pub type TransactionStream = BoxStream<'static, VerificationResult>;

/// The platform store: issues, signs and verifies transactions.
///
/// Everything the service knows about purchases comes through this trait.
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait StoreAuthority: Send + Sync {
    /// Whether this platform variant can run a direct purchase flow
    fn supports_purchase(&self) -> bool {
        true
    }

    async fn fetch_products(&self, ids: &[String]) -> Result<Vec<Product>>;

    async fn purchase(
        &self,
        product: &Product,
        options: &[PurchaseOption],
    ) -> Result<PurchaseOutcome>;

    /// Most recent transaction for a product, if the user ever bought it
    async fn latest_transaction(&self, product_id: &str) -> Result<Option<VerificationResult>>;

    /// Finite snapshot of the transactions currently granting entitlements
    async fn current_entitlements(&self) -> TransactionStream;

    /// Unbounded stream of renewals, revocations and out-of-band purchases
    async fn transaction_updates(&self) -> TransactionStream;

    /// Acknowledge a transaction so it is not redelivered. Redundant calls are no-ops.
    async fn finish(&self, transaction: &Transaction);
}
