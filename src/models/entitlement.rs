use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::transaction::{Transaction, VerificationError};

/// Point-in-time view of the user's entitlements.
///
/// Verified transactions are keyed by transaction id so repeated deliveries
/// collapse into one entry. Entries that failed verification are kept apart
/// and never count as entitlements.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementSnapshot {
    pub transactions: BTreeMap<u64, Transaction>,
    pub rejected: Vec<RejectedTransaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedTransaction {
    pub transaction_id: u64,
    pub product_id: String,
    pub reason: VerificationError,
}

impl EntitlementSnapshot {
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn contains_product(&self, product_id: &str) -> bool {
        self.transactions
            .values()
            .any(|t| t.product_id == product_id)
    }

    pub fn product_ids(&self) -> BTreeSet<&str> {
        self.transactions
            .values()
            .map(|t| t.product_id.as_str())
            .collect()
    }
}
