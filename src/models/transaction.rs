use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::product::ProductKind;
use crate::error::{Result, StoreError};

/// Signed transaction issued by the store authority.
///
/// The service only reads these fields. Identity is `id`; renewals of the
/// same subscription share `original_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: u64,
    pub original_id: u64,
    pub product_id: String,
    pub product_kind: ProductKind,
    pub purchase_date: DateTime<Utc>,
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revocation_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revocation_reason: Option<RevocationReason>,
    #[serde(default)]
    pub app_account_token: Option<Uuid>,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    DeveloperIssue,
    Other,
}

impl Transaction {
    /// A transaction is valid when it has not been revoked and its
    /// expiration, if any, is strictly after `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.revocation_date.is_some() {
            return false;
        }
        match self.expiration_date {
            Some(expires) => expires > now,
            None => true,
        }
    }
}

/// Reason the authority could not vouch for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum VerificationError {
    #[error("signing certificate has been revoked")]
    RevokedCertificate,
    #[error("certificate chain is invalid")]
    InvalidCertificateChain,
    #[error("device verification does not match")]
    InvalidDeviceVerification,
    #[error("payload encoding is invalid")]
    InvalidEncoding,
    #[error("signature is invalid")]
    InvalidSignature,
    #[error("required properties are missing")]
    MissingRequiredProperties,
}

/// A transaction together with the authority's verdict on its signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    Verified(Transaction),
    Unverified(Transaction, VerificationError),
}

impl VerificationResult {
    /// Unwrap the payload, failing if the signature check did not pass
    pub fn verify(self) -> Result<Transaction> {
        match self {
            VerificationResult::Verified(transaction) => Ok(transaction),
            VerificationResult::Unverified(transaction, reason) => {
                Err(StoreError::VerificationFailed {
                    transaction: Box::new(transaction),
                    reason,
                })
            }
        }
    }

    /// Payload regardless of verdict. Never treat it as trusted.
    pub fn payload(&self) -> &Transaction {
        match self {
            VerificationResult::Verified(transaction)
            | VerificationResult::Unverified(transaction, _) => transaction,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationResult::Verified(_))
    }
}
