//! Transaction lifecycle status.

use crate::TypesError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a transaction job.
///
/// `Queued → Submitted → Confirmed`, or `Queued → Failed` on terminal error.
/// A retryable failure re-enters `Queued`. The engine never writes status
/// again once a transaction is `Submitted`; the confirmation listener owns
/// the `Submitted → Confirmed` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Queued,
    Submitted,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Queued => "queued",
            TxStatus::Submitted => "submitted",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Failed => "failed",
        }
    }

    /// Whether the status is terminal for the engine (no further builds).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Confirmed | TxStatus::Failed)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxStatus {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, TypesError> {
        match s {
            "queued" => Ok(TxStatus::Queued),
            "submitted" => Ok(TxStatus::Submitted),
            "confirmed" => Ok(TxStatus::Confirmed),
            "failed" => Ok(TxStatus::Failed),
            other => Err(TypesError::InvalidStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        for s in [
            TxStatus::Queued,
            TxStatus::Submitted,
            TxStatus::Confirmed,
            TxStatus::Failed,
        ] {
            assert_eq!(s.as_str().parse::<TxStatus>().unwrap(), s);
        }
    }

    #[test]
    fn test_terminal() {
        assert!(!TxStatus::Queued.is_terminal());
        assert!(!TxStatus::Submitted.is_terminal());
        assert!(TxStatus::Confirmed.is_terminal());
        assert!(TxStatus::Failed.is_terminal());
    }

    #[test]
    fn test_unknown_rejected() {
        assert!("pending".parse::<TxStatus>().is_err());
    }
}
