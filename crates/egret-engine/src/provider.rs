//! The ledger data provider seam.
//!
//! The engine consumes exactly five provider operations. [`ChainClient`]
//! is the production implementation; scenario tests script their own.

use async_trait::async_trait;
use egret_ledger::{ChainClient, LedgerError};
use egret_types::UnspentOutput;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Complete unspent-output set for an address.
    async fn utxos_for(&self, address: &str) -> Result<Vec<UnspentOutput>, LedgerError>;

    /// Fee implied by a serialized transaction of `size` bytes.
    async fn fee_for_size(&self, size: usize) -> Result<u64, LedgerError>;

    /// Worst-case fee, used as the selection ceiling and draft placeholder.
    async fn fee_ceiling(&self) -> Result<u64, LedgerError>;

    /// Minimum coin an output of `size` serialized bytes must hold.
    async fn min_coin_for_size(&self, size: usize) -> Result<u64, LedgerError>;

    /// Submit a serialized transaction; `Err(LedgerError::Rejected(_))`
    /// carries the classified rejection.
    async fn submit(&self, tx_bytes: Vec<u8>) -> Result<String, LedgerError>;
}

#[async_trait]
impl Provider for ChainClient {
    async fn utxos_for(&self, address: &str) -> Result<Vec<UnspentOutput>, LedgerError> {
        ChainClient::utxos_for(self, address).await
    }

    async fn fee_for_size(&self, size: usize) -> Result<u64, LedgerError> {
        ChainClient::fee_for_size(self, size).await
    }

    async fn fee_ceiling(&self) -> Result<u64, LedgerError> {
        ChainClient::fee_ceiling(self).await
    }

    async fn min_coin_for_size(&self, size: usize) -> Result<u64, LedgerError> {
        ChainClient::min_coin_for_size(self, size).await
    }

    async fn submit(&self, tx_bytes: Vec<u8>) -> Result<String, LedgerError> {
        ChainClient::submit(self, tx_bytes).await
    }
}
