//! Native transaction codec.
//!
//! Typed transaction structures and their canonical CBOR serialization:
//! bodies, witness sets, native minting scripts, and auxiliary metadata.
//! Consumers treat this crate as a black-box encoder; the processing engine
//! owns no wire-format logic of its own.

pub mod cbor;
pub mod hashing;
pub mod metadata;
pub mod script;
pub mod transaction;

pub use script::NativeScript;
pub use transaction::{
    Mint, Transaction, TransactionBody, TransactionInput, TransactionOutput, VKeyWitness,
    WitnessSet,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TxError {
    #[error("invalid transaction hash: {0}")]
    InvalidHash(String),

    #[error("address error: {0}")]
    Address(#[from] egret_types::TypesError),

    #[error("invalid witness key material: {0}")]
    InvalidKey(String),

    #[error("witness verification failed for key {0}")]
    WitnessInvalid(String),

    #[error("unsupported metadata value: {0}")]
    Metadata(String),

    #[error("mint quantity for {0}.{1} must be nonzero")]
    ZeroMint(String, String),
}
