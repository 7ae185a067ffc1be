//! Engine error taxonomy.

use egret_keys::KeysError;
use egret_ledger::LedgerError;
use egret_store::StoreError;
use egret_tx::TxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("key error: {0}")]
    Keys(#[from] KeysError),

    #[error("codec error: {0}")]
    Codec(#[from] TxError),

    #[error("wallet not found: {0}")]
    WalletNotFound(String),

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("minting policy not found: {0}")]
    PolicyNotFound(String),

    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("invalid job: {0}")]
    InvalidJob(String),

    #[error("value conservation violated: {0}")]
    ConservationViolated(String),
}

impl EngineError {
    /// Build-stage failures that no retry can repair. These fail the job
    /// immediately, before (or instead of) any ledger call.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineError::WalletNotFound(_)
                | EngineError::PolicyNotFound(_)
                | EngineError::InsufficientBalance(_)
                | EngineError::InvalidJob(_)
                | EngineError::Keys(_)
                | EngineError::Codec(_)
                | EngineError::ConservationViolated(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classes() {
        assert!(EngineError::InsufficientBalance("x".into()).is_terminal());
        assert!(EngineError::PolicyNotFound("p".into()).is_terminal());
        assert!(EngineError::InvalidJob("j".into()).is_terminal());
    }

    #[test]
    fn test_retryable_classes() {
        let ledger = EngineError::Ledger(LedgerError::Payload("x".into()));
        assert!(!ledger.is_terminal());
        let store = EngineError::Store(StoreError::Malformed("x".into()));
        assert!(!store.is_terminal());
    }
}
