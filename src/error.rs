use crate::models::transaction::{Transaction, VerificationError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Transaction {id} could not be verified: {reason}", id = .transaction.id)]
    VerificationFailed {
        transaction: Box<Transaction>,
        reason: VerificationError,
    },

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Store authority error: {0}")]
    Authority(String),

    #[error("Transaction listener is already running")]
    ListenerAlreadyRunning,

    #[error("Transaction listener was stopped and cannot be restarted")]
    ListenerStopped,

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl StoreError {
    /// Stable machine-readable code, suitable for logs and client payloads
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::VerificationFailed { .. } => "VERIFICATION_FAILED",
            StoreError::UnsupportedPlatform(_) => "UNSUPPORTED_PLATFORM",
            StoreError::Authority(_) => "AUTHORITY_ERROR",
            StoreError::ListenerAlreadyRunning => "LISTENER_ALREADY_RUNNING",
            StoreError::ListenerStopped => "LISTENER_STOPPED",
            StoreError::Config(_) => "CONFIG_ERROR",
            StoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

// Helper type for results
pub type Result<T> = std::result::Result<T, StoreError>;
