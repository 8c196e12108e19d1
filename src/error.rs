//! Error types for the transaction spammer

use thiserror::Error;

/// Main error type for the spammer
#[derive(Error, Debug)]
pub enum SpammerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Slot targets {slots:?} require a beacon RPC endpoint")]
    SchedulingPrecondition { slots: Vec<u8> },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("RPC call {method} failed: {message}")]
    Rpc {
        method: &'static str,
        message: String,
    },

    #[error("Gas estimation error: {0}")]
    GasEstimation(String),

    #[error("Beacon API error: {0}")]
    Beacon(String),

    #[error("Transaction {tx_hash} not found")]
    TransactionNotFound { tx_hash: String },

    #[error("Transaction {tx_hash} reverted: {}", .reason.as_deref().unwrap_or("no reason returned"))]
    Reverted {
        tx_hash: String,
        reason: Option<String>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SpammerError {
    /// Errors raised while resolving the run configuration, before any network activity
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SpammerError::Config(_) | SpammerError::SchedulingPrecondition { .. }
        )
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, SpammerError::Rpc { .. } | SpammerError::Beacon(_))
    }

    pub(crate) fn rpc(method: &'static str, err: impl std::fmt::Display) -> Self {
        SpammerError::Rpc {
            method,
            message: err.to_string(),
        }
    }
}

/// Result type for spammer operations
pub type SpammerResult<T> = Result<T, SpammerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_class() {
        assert!(SpammerError::Config("missing key".into()).is_configuration());
        assert!(SpammerError::SchedulingPrecondition { slots: vec![0] }.is_configuration());
        assert!(!SpammerError::rpc("eth_chainId", "connection refused").is_configuration());
    }

    #[test]
    fn test_reverted_display() {
        let err = SpammerError::Reverted {
            tx_hash: "0xabc".into(),
            reason: Some("execution reverted: paused".into()),
        };
        assert_eq!(
            err.to_string(),
            "Transaction 0xabc reverted: execution reverted: paused"
        );

        let err = SpammerError::Reverted {
            tx_hash: "0xabc".into(),
            reason: None,
        };
        assert!(err.to_string().ends_with("no reason returned"));
    }
}
