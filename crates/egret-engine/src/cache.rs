//! Per-address balance cache.
//!
//! An injected service instance holding the believed-spendable unspent
//! outputs per wallet address. The cache is a performance and coordination
//! aid, not a correctness mechanism: ownership of one address's entry is
//! conferred by the worker pool's per-wallet exclusivity, so the interior
//! mutex only arbitrates between workers of *different* addresses.

use crate::provider::Provider;
use egret_ledger::LedgerError;
use egret_types::UnspentOutput;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct BalanceCache {
    entries: Mutex<HashMap<String, Vec<UnspentOutput>>>,
}

impl BalanceCache {
    pub fn new() -> Self {
        BalanceCache::default()
    }

    /// Current cached outputs for an address, if any.
    pub fn get(&self, address: &str) -> Option<Vec<UnspentOutput>> {
        self.lock().get(address).cloned()
    }

    /// Replace the cached set for an address.
    pub fn put(&self, address: &str, outputs: Vec<UnspentOutput>) {
        self.lock().insert(address.to_string(), outputs);
    }

    /// Drop the entry so the next read refreshes from the ledger.
    pub fn invalidate(&self, address: &str) {
        self.lock().remove(address);
    }

    /// Cached outputs, refreshing from the provider when the entry is
    /// missing or empty.
    pub async fn get_or_refresh<P: Provider + ?Sized>(
        &self,
        provider: &P,
        address: &str,
    ) -> Result<Vec<UnspentOutput>, LedgerError> {
        if let Some(cached) = self.get(address) {
            if !cached.is_empty() {
                return Ok(cached);
            }
        }
        self.refresh(provider, address).await
    }

    /// Fetch the complete set from the provider and replace the entry
    /// atomically.
    pub async fn refresh<P: Provider + ?Sized>(
        &self,
        provider: &P,
        address: &str,
    ) -> Result<Vec<UnspentOutput>, LedgerError> {
        let fresh = provider.utxos_for(address).await?;
        log::info!("refreshed {} unspent outputs for {address}", fresh.len());
        self.put(address, fresh.clone());
        Ok(fresh)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<UnspentOutput>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
