//! Core types for the Egret custodial transaction engine.
//!
//! This crate provides the foundational types used across all Egret crates:
//! asset units, multi-asset values, unspent outputs, transaction lifecycle
//! status, address validation, and slot arithmetic.

pub mod address;
pub mod slot;
pub mod status;
pub mod unit;
pub mod utxo;
pub mod value;

pub use status::TxStatus;
pub use unit::Unit;
pub use utxo::UnspentOutput;
pub use value::Value;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TypesError {
    #[error("invalid unit: {0}")]
    InvalidUnit(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("quantity overflow for unit {0}")]
    QuantityOverflow(String),
}
