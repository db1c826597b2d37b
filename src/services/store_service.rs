use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::{
    authority::StoreAuthority,
    clock::{Clock, SystemClock},
    transaction_listener::{ListenerHandle, TransactionListener, TransactionObserver},
};
use crate::{
    config::{Config, ListenerConfig},
    error::{Result, StoreError},
    models::{
        entitlement::{EntitlementSnapshot, RejectedTransaction},
        product::Product,
        purchase::{PurchaseOption, PurchaseOutcome, PurchaseResult},
        transaction::{Transaction, VerificationResult},
    },
};

/// Verify a result and acknowledge it to the authority.
///
/// Unverified results fail without touching the authority.
pub(crate) async fn finalize_with(
    authority: &dyn StoreAuthority,
    result: VerificationResult,
) -> Result<Transaction> {
    let transaction = result.verify()?;
    authority.finish(&transaction).await;
    Ok(transaction)
}

enum ListenerState {
    Idle,
    Running(ListenerHandle),
    Stopped,
}

/// Purchase reconciliation façade over a store authority.
///
/// Tracked product ids are fixed at construction. To track a different set,
/// build a new service.
pub struct StoreService {
    authority: Arc<dyn StoreAuthority>,
    clock: Arc<dyn Clock>,
    product_ids: Vec<String>,
    listener_config: ListenerConfig,
    listener: Mutex<ListenerState>,
}

impl StoreService {
    pub fn new(authority: Arc<dyn StoreAuthority>, config: &Config) -> Self {
        let mut product_ids: Vec<String> = Vec::with_capacity(config.store.product_ids.len());
        for id in &config.store.product_ids {
            if !product_ids.contains(id) {
                product_ids.push(id.clone());
            }
        }

        Self {
            authority,
            clock: Arc::new(SystemClock),
            product_ids,
            listener_config: config.listener.clone(),
            listener: Mutex::new(ListenerState::Idle),
        }
    }

    /// Evaluate validity against `clock` instead of the system time
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn product_ids(&self) -> &[String] {
        &self.product_ids
    }

    /// Fetch catalog entries for `ids`, or for the tracked ids when `ids` is empty.
    ///
    /// Authority failures are logged and yield an empty list.
    #[instrument(skip(self))]
    pub async fn fetch_products(&self, ids: &[String]) -> Vec<Product> {
        let ids = if ids.is_empty() {
            self.product_ids.as_slice()
        } else {
            ids
        };

        match self.authority.fetch_products(ids).await {
            Ok(products) => {
                debug!(requested = ids.len(), found = products.len(), "Fetched products");
                products
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch products, returning empty catalog");
                Vec::new()
            }
        }
    }

    /// Run the authority's purchase flow and classify the outcome.
    ///
    /// Callers must not start a second purchase for the same product while
    /// one is in flight; the service does not serialize them.
    #[instrument(skip(self, product, options), fields(product_id = %product.id))]
    pub async fn purchase(
        &self,
        product: &Product,
        options: &[PurchaseOption],
    ) -> Result<PurchaseResult> {
        if !self.authority.supports_purchase() {
            return Err(StoreError::UnsupportedPlatform(
                "direct purchase flow is not available on this platform".to_string(),
            ));
        }

        let outcome = match self.authority.purchase(product, options).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Purchase flow failed");
                return Ok(PurchaseResult::VerificationFailed {
                    reason: e.to_string(),
                });
            }
        };

        let result = match outcome {
            PurchaseOutcome::Success(verification) => match self.finalize(verification).await {
                Ok(transaction) if transaction.is_valid_at(self.clock.now()) => {
                    PurchaseResult::Success(transaction)
                }
                Ok(transaction) => PurchaseResult::ValidityFailed(transaction),
                Err(e) => {
                    warn!(error = %e, "Purchased transaction failed verification");
                    PurchaseResult::VerificationFailed {
                        reason: e.to_string(),
                    }
                }
            },
            PurchaseOutcome::Pending => PurchaseResult::Pending,
            PurchaseOutcome::UserCancelled => PurchaseResult::Cancelled,
            PurchaseOutcome::Other(description) => {
                warn!(outcome = %description, "Unrecognized purchase outcome");
                PurchaseResult::Unknown
            }
        };

        info!(result = result.as_str(), "Purchase completed");
        Ok(result)
    }

    pub async fn purchase_default(&self, product: &Product) -> Result<PurchaseResult> {
        self.purchase(product, &[]).await
    }

    /// Verify and acknowledge a delivered transaction
    pub async fn finalize(&self, result: VerificationResult) -> Result<Transaction> {
        let transaction = finalize_with(self.authority.as_ref(), result).await?;
        debug!(transaction_id = transaction.id, "Finished transaction");
        Ok(transaction)
    }

    /// Latest transaction for `product_id` if it is verified and currently valid
    #[instrument(skip(self))]
    pub async fn latest_valid_transaction(&self, product_id: &str) -> Result<Option<Transaction>> {
        let Some(latest) = self.authority.latest_transaction(product_id).await? else {
            return Ok(None);
        };

        let transaction = latest.verify()?;
        if transaction.is_valid_at(self.clock.now()) {
            Ok(Some(transaction))
        } else {
            debug!(transaction_id = transaction.id, "Latest transaction is not valid");
            Ok(None)
        }
    }

    /// Latest valid transaction of every tracked product, in tracked order
    pub async fn valid_transactions(&self) -> Result<Vec<Transaction>> {
        let mut transactions = Vec::new();
        for id in &self.product_ids {
            if let Some(transaction) = self.checked_latest(id).await? {
                transactions.push(transaction);
            }
        }
        Ok(transactions)
    }

    /// First tracked product, in configured order, holding a valid transaction
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<Option<Transaction>> {
        for id in &self.product_ids {
            if let Some(transaction) = self.checked_latest(id).await? {
                info!(
                    product_id = %transaction.product_id,
                    transaction_id = transaction.id,
                    "Restored purchase"
                );
                return Ok(Some(transaction));
            }
        }

        info!("No valid purchase to restore");
        Ok(None)
    }

    /// Like `latest_valid_transaction`, but a verification failure only skips the product
    async fn checked_latest(&self, product_id: &str) -> Result<Option<Transaction>> {
        match self.latest_valid_transaction(product_id).await {
            Err(e @ StoreError::VerificationFailed { .. }) => {
                warn!(product_id, error = %e, "Ignoring unverified transaction");
                Ok(None)
            }
            other => other,
        }
    }

    /// Snapshot of the authority's current entitlements, deduplicated by transaction id
    #[instrument(skip(self))]
    pub async fn current_entitlements(&self) -> EntitlementSnapshot {
        let mut snapshot = EntitlementSnapshot::default();
        let mut entitlements = self.authority.current_entitlements().await;

        while let Some(result) = entitlements.next().await {
            match result {
                VerificationResult::Verified(transaction) => {
                    snapshot.transactions.insert(transaction.id, transaction);
                }
                VerificationResult::Unverified(transaction, reason) => {
                    warn!(
                        transaction_id = transaction.id,
                        product_id = %transaction.product_id,
                        %reason,
                        "Dropping unverified entitlement"
                    );
                    snapshot.rejected.push(RejectedTransaction {
                        transaction_id: transaction.id,
                        product_id: transaction.product_id,
                        reason,
                    });
                }
            }
        }

        debug!(
            entitlements = snapshot.len(),
            rejected = snapshot.rejected.len(),
            "Collected current entitlements"
        );
        snapshot
    }

    /// Start the background transaction listener. It can run once per service.
    pub async fn start_listener(&self, observer: impl TransactionObserver + 'static) -> Result<()> {
        let mut state = self.listener.lock().await;
        let finished = match &*state {
            ListenerState::Running(handle) if handle.is_running() => {
                return Err(StoreError::ListenerAlreadyRunning)
            }
            ListenerState::Running(_) => true,
            ListenerState::Stopped => return Err(StoreError::ListenerStopped),
            ListenerState::Idle => false,
        };
        if finished {
            // The update stream ended on its own; the task is gone
            *state = ListenerState::Stopped;
            return Err(StoreError::ListenerStopped);
        }

        let listener = TransactionListener::new(
            Arc::clone(&self.authority),
            Arc::clone(&self.clock),
            Arc::new(observer),
            self.listener_config.clone(),
        );
        *state = ListenerState::Running(listener.start());

        info!("Started transaction listener");
        Ok(())
    }

    pub async fn is_listening(&self) -> bool {
        match &*self.listener.lock().await {
            ListenerState::Running(handle) => handle.is_running(),
            _ => false,
        }
    }

    /// Cancel the listener and wait for it to exit. Further starts are rejected.
    pub async fn shutdown(&self) {
        let mut state = self.listener.lock().await;
        if let ListenerState::Running(handle) =
            std::mem::replace(&mut *state, ListenerState::Stopped)
        {
            handle.stop().await;
        }
    }
}
