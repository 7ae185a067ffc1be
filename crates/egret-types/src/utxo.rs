//! Unspent-output cache entries.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// An unspent output as held by the balance cache. Ephemeral: never
/// persisted, bounded by explicit invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub tx_hash: String,
    pub index: u32,
    pub value: Value,
}

impl UnspentOutput {
    pub fn new(tx_hash: impl Into<String>, index: u32, value: Value) -> Self {
        UnspentOutput {
            tx_hash: tx_hash.into(),
            index,
            value,
        }
    }

    /// Stable identifier used to detect double allocation.
    pub fn id(&self) -> String {
        format!("{}#{}", self.tx_hash, self.index)
    }

    /// Whether this output carries only coin.
    pub fn is_coin_only(&self) -> bool {
        self.value.assets.is_empty()
    }
}
