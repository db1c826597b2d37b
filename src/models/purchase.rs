use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transaction::{Transaction, VerificationResult};

/// Options forwarded untouched to the authority's purchase flow
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOption {
    Quantity(u32),
    AppAccountToken(Uuid),
    SimulatesAskToBuyInSandbox(bool),
    Custom { key: String, value: String },
}

/// Raw outcome of the authority's purchase flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Success(VerificationResult),
    Pending,
    UserCancelled,
    /// Outcome this crate does not know how to interpret
    Other(String),
}

/// Classified purchase result handed back to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum PurchaseResult {
    Success(Transaction),
    Cancelled,
    /// Awaiting approval; no transaction yet
    Pending,
    VerificationFailed { reason: String },
    /// Verified and finished, but not currently valid
    ValidityFailed(Transaction),
    Unknown,
}

impl PurchaseResult {
    pub fn transaction(&self) -> Option<&Transaction> {
        match self {
            PurchaseResult::Success(t) | PurchaseResult::ValidityFailed(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PurchaseResult::Success(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseResult::Success(_) => "success",
            PurchaseResult::Cancelled => "cancelled",
            PurchaseResult::Pending => "pending",
            PurchaseResult::VerificationFailed { .. } => "verification_failed",
            PurchaseResult::ValidityFailed(_) => "validity_failed",
            PurchaseResult::Unknown => "unknown",
        }
    }
}
