//! SQLite-backed persistence for the Egret engine.
//!
//! Stores wallets, minting policies, and transaction jobs with their
//! requested outputs (and per-output assets) and mint declarations.
//! Quantities are stored as decimal text to avoid numeric overflow; the
//! engine parses them on load.

mod store;

pub use store::{
    MintRow, NewMint, NewOutput, NewOutputAsset, OutputRecord, PolicyRow, Store, TransactionJob,
    TransactionRow, WalletRow,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("wallet not found: {0}")]
    WalletNotFound(String),

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("{0} already exists")]
    Conflict(String),

    #[error("stored value malformed: {0}")]
    Malformed(String),
}
