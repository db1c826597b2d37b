//! In-memory store authority for local runs and tests.
//!
//! Products come from [`SandboxConfig`]. Purchase outcomes can be scripted
//! per product, and update events pushed with [`SandboxAuthority::push_update`]
//! reach every open update stream. Updates pushed while nobody listens are
//! held back and delivered to the next subscriber, the way the platform
//! redelivers unfinished transactions.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Months, Utc};
use futures::{channel::mpsc, stream, StreamExt};
use tracing::debug;

use crate::{
    config::SandboxConfig,
    error::{Result, StoreError},
    models::{
        product::{PeriodUnit, Product, ProductKind, SubscriptionPeriod},
        purchase::{PurchaseOption, PurchaseOutcome},
        transaction::{Transaction, VerificationError, VerificationResult},
    },
    services::{
        authority::{StoreAuthority, TransactionStream},
        clock::{Clock, SystemClock},
    },
};

/// Scripted behavior for the next purchase of a product
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedPurchase {
    /// Signed, verified, expiring after one subscription period
    Complete,
    /// Signed and verified with explicit dates
    CompleteWith {
        expiration_date: Option<DateTime<Utc>>,
        revocation_date: Option<DateTime<Utc>>,
    },
    CompleteUnverified(VerificationError),
    Pending,
    Cancel,
    /// An outcome newer than this crate knows about
    Unrecognized(String),
    Fail(String),
}

#[derive(Default)]
struct SandboxState {
    products: Vec<Product>,
    fail_catalog: bool,
    scripted: HashMap<String, VecDeque<ScriptedPurchase>>,
    latest: HashMap<String, VerificationResult>,
    entitlements: Vec<VerificationResult>,
    subscribers: Vec<mpsc::UnboundedSender<VerificationResult>>,
    undelivered: Vec<VerificationResult>,
    finished: Vec<u64>,
    next_id: u64,
}

pub struct SandboxAuthority {
    supports_purchase: bool,
    clock: Arc<dyn Clock>,
    state: Mutex<SandboxState>,
}

impl SandboxAuthority {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            supports_purchase: config.supports_purchase,
            clock: Arc::new(SystemClock),
            state: Mutex::new(SandboxState {
                products: config.products.clone(),
                fail_catalog: config.fail_catalog,
                next_id: 1000,
                ..Default::default()
            }),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn state(&self) -> MutexGuard<'_, SandboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_fail_catalog(&self, fail: bool) {
        self.state().fail_catalog = fail;
    }

    /// Queue an outcome for the next purchase of `product_id`. Unscripted purchases complete.
    pub fn script_purchase(&self, product_id: &str, scripted: ScriptedPurchase) {
        self.state()
            .scripted
            .entry(product_id.to_string())
            .or_default()
            .push_back(scripted);
    }

    /// Replace the latest transaction recorded for the payload's product
    pub fn set_latest(&self, result: VerificationResult) {
        let product_id = result.payload().product_id.clone();
        self.state().latest.insert(product_id, result);
    }

    pub fn add_entitlement(&self, result: VerificationResult) {
        self.state().entitlements.push(result);
    }

    /// Deliver an update to every open update stream.
    ///
    /// Returns the number of streams reached; zero means the update was held back.
    pub fn push_update(&self, result: VerificationResult) -> usize {
        let mut state = self.state();
        state
            .subscribers
            .retain(|sender| !sender.is_closed());

        let mut delivered = 0;
        for sender in &state.subscribers {
            if sender.unbounded_send(result.clone()).is_ok() {
                delivered += 1;
            }
        }

        if delivered == 0 {
            state.undelivered.push(result);
        }
        delivered
    }

    /// Close every open update stream, as when the platform tears down its feed
    pub fn end_updates(&self) {
        self.state().subscribers.clear();
    }

    /// Ids of every transaction acknowledged through `finish`, in call order
    pub fn finished(&self) -> Vec<u64> {
        self.state().finished.clone()
    }

    /// Mint a transaction id unique within this sandbox
    pub fn next_transaction_id(&self) -> u64 {
        let mut state = self.state();
        state.next_id += 1;
        state.next_id
    }

    fn expiration_for(&self, product: &Product, purchased: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if product.kind != ProductKind::AutoRenewable {
            return None;
        }
        let SubscriptionPeriod { unit, value } = product
            .subscription_period
            .unwrap_or(SubscriptionPeriod::new(PeriodUnit::Month, 1));

        match unit {
            PeriodUnit::Day => purchased.checked_add_signed(Duration::days(value.into())),
            PeriodUnit::Week => purchased.checked_add_signed(Duration::weeks(value.into())),
            PeriodUnit::Month => purchased.checked_add_months(Months::new(value)),
            PeriodUnit::Year => purchased.checked_add_months(Months::new(value.saturating_mul(12))),
        }
    }

    fn mint(
        &self,
        product: &Product,
        options: &[PurchaseOption],
        expiration_date: Option<DateTime<Utc>>,
        revocation_date: Option<DateTime<Utc>>,
    ) -> Transaction {
        let id = self.next_transaction_id();
        let mut transaction = Transaction {
            id,
            original_id: id,
            product_id: product.id.clone(),
            product_kind: product.kind,
            purchase_date: self.clock.now(),
            expiration_date,
            revocation_date,
            revocation_reason: None,
            app_account_token: None,
            quantity: 1,
        };

        for option in options {
            match option {
                PurchaseOption::Quantity(quantity) => transaction.quantity = *quantity,
                PurchaseOption::AppAccountToken(token) => {
                    transaction.app_account_token = Some(*token)
                }
                PurchaseOption::SimulatesAskToBuyInSandbox(_) | PurchaseOption::Custom { .. } => {}
            }
        }

        // Renewals keep the first purchase's original id
        if let Some(previous) = self.state().latest.get(&product.id) {
            transaction.original_id = previous.payload().original_id;
        }
        transaction
    }

    /// Track the purchase as latest for its product. The entitlement list
    /// holds one transaction per `original_id`, and only while it grants access.
    fn record(&self, result: &VerificationResult) {
        let now = self.clock.now();
        let payload = result.payload();
        let mut state = self.state();
        state
            .latest
            .insert(payload.product_id.clone(), result.clone());

        state
            .entitlements
            .retain(|existing| existing.payload().original_id != payload.original_id);
        if payload.product_kind != ProductKind::Consumable && payload.is_valid_at(now) {
            state.entitlements.push(result.clone());
        }
    }
}

#[async_trait]
impl StoreAuthority for SandboxAuthority {
    fn supports_purchase(&self) -> bool {
        self.supports_purchase
    }

    async fn fetch_products(&self, ids: &[String]) -> Result<Vec<Product>> {
        let state = self.state();
        if state.fail_catalog {
            return Err(StoreError::Authority(
                "sandbox catalog is unavailable".to_string(),
            ));
        }

        Ok(ids
            .iter()
            .filter_map(|id| state.products.iter().find(|p| &p.id == id).cloned())
            .collect())
    }

    async fn purchase(
        &self,
        product: &Product,
        options: &[PurchaseOption],
    ) -> Result<PurchaseOutcome> {
        let scripted = self
            .state()
            .scripted
            .get_mut(&product.id)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(ScriptedPurchase::Complete);
        debug!(product_id = %product.id, ?scripted, "Sandbox purchase");

        let result = match scripted {
            ScriptedPurchase::Complete => {
                let expiration = self.expiration_for(product, self.clock.now());
                VerificationResult::Verified(self.mint(product, options, expiration, None))
            }
            ScriptedPurchase::CompleteWith {
                expiration_date,
                revocation_date,
            } => VerificationResult::Verified(self.mint(
                product,
                options,
                expiration_date,
                revocation_date,
            )),
            ScriptedPurchase::CompleteUnverified(reason) => {
                let expiration = self.expiration_for(product, self.clock.now());
                VerificationResult::Unverified(
                    self.mint(product, options, expiration, None),
                    reason,
                )
            }
            ScriptedPurchase::Pending => return Ok(PurchaseOutcome::Pending),
            ScriptedPurchase::Cancel => return Ok(PurchaseOutcome::UserCancelled),
            ScriptedPurchase::Unrecognized(description) => {
                return Ok(PurchaseOutcome::Other(description))
            }
            ScriptedPurchase::Fail(message) => return Err(StoreError::Authority(message)),
        };

        self.record(&result);
        Ok(PurchaseOutcome::Success(result))
    }

    async fn latest_transaction(&self, product_id: &str) -> Result<Option<VerificationResult>> {
        Ok(self.state().latest.get(product_id).cloned())
    }

    async fn current_entitlements(&self) -> TransactionStream {
        let entitlements = self.state().entitlements.clone();
        stream::iter(entitlements).boxed()
    }

    async fn transaction_updates(&self) -> TransactionStream {
        let (sender, receiver) = mpsc::unbounded();
        let mut state = self.state();
        for held in state.undelivered.drain(..) {
            let _ = sender.unbounded_send(held);
        }
        state.subscribers.push(sender);
        receiver.boxed()
    }

    async fn finish(&self, transaction: &Transaction) {
        debug!(transaction_id = transaction.id, "Sandbox finish");
        self.state().finished.push(transaction.id);
    }
}
