use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{authority::StoreAuthority, clock::Clock, store_service::finalize_with};
use crate::{
    config::ListenerConfig,
    models::transaction::{Transaction, VerificationResult},
};

/// Receives every transaction the listener accepts
pub trait TransactionObserver: Send + Sync {
    fn on_transaction(&self, transaction: &Transaction);
}

impl<F> TransactionObserver for F
where
    F: Fn(&Transaction) + Send + Sync,
{
    fn on_transaction(&self, transaction: &Transaction) {
        self(transaction)
    }
}

/// Background consumer of the authority's transaction update stream
pub(crate) struct TransactionListener {
    authority: Arc<dyn StoreAuthority>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn TransactionObserver>,
    config: ListenerConfig,
}

impl TransactionListener {
    pub fn new(
        authority: Arc<dyn StoreAuthority>,
        clock: Arc<dyn Clock>,
        observer: Arc<dyn TransactionObserver>,
        config: ListenerConfig,
    ) -> Self {
        Self {
            authority,
            clock,
            observer,
            config,
        }
    }

    /// Spawn the listener on the current runtime.
    ///
    /// The returned handle owns the only shutdown sender; dropping it also
    /// stops the task.
    pub fn start(self) -> ListenerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task_handle = tokio::spawn(async move {
            self.run(shutdown_rx).await;
        });

        ListenerHandle {
            shutdown_tx,
            task_handle,
        }
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        // `changed()` also resolves with an error once the handle is dropped
        if self.config.sync_entitlements_on_start {
            let mut entitlements = self.authority.current_entitlements().await;
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        info!("Transaction listener cancelled during entitlement sync");
                        return;
                    }
                    next = entitlements.next() => match next {
                        Some(result) => self.replay_entitlement(result),
                        None => break,
                    }
                }
            }
        }

        let mut updates = self.authority.transaction_updates().await;
        info!("Transaction listener subscribed to updates");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Transaction listener cancelled");
                    return;
                }
                next = updates.next() => match next {
                    Some(result) => self.handle_update(result).await,
                    None => {
                        info!("Transaction update stream ended");
                        return;
                    }
                }
            }
        }
    }

    /// Entitlements were finished when first delivered, so only notify
    fn replay_entitlement(&self, result: VerificationResult) {
        match result.verify() {
            Ok(transaction) if transaction.is_valid_at(self.clock.now()) => {
                debug!(
                    transaction_id = transaction.id,
                    product_id = %transaction.product_id,
                    "Replaying current entitlement"
                );
                self.observer.on_transaction(&transaction);
            }
            Ok(transaction) => {
                debug!(
                    transaction_id = transaction.id,
                    "Skipping entitlement that is no longer valid"
                );
            }
            Err(e) => warn!(error = %e, "Skipping unverified entitlement"),
        }
    }

    async fn handle_update(&self, result: VerificationResult) {
        match finalize_with(self.authority.as_ref(), result).await {
            Ok(transaction) => {
                info!(
                    transaction_id = transaction.id,
                    product_id = %transaction.product_id,
                    valid = transaction.is_valid_at(self.clock.now()),
                    "Finished transaction update"
                );
                self.observer.on_transaction(&transaction);
            }
            Err(e) => {
                warn!(error = %e, code = e.code(), "Transaction listener error");
            }
        }
    }
}

/// Handle for the running listener task
pub(crate) struct ListenerHandle {
    shutdown_tx: watch::Sender<bool>,
    task_handle: tokio::task::JoinHandle<()>,
}

impl ListenerHandle {
    /// Signal cancellation and wait for the task to exit
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task_handle.await {
            warn!(error = %e, "Transaction listener task did not exit cleanly");
        }
        info!("Transaction listener stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.task_handle.is_finished()
    }
}
