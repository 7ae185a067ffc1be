//! Key management for the Egret engine.
//!
//! Signing material is held sealed (AES-256-GCM under a master key supplied
//! by configuration) and only unsealed into short-lived [`Signer`]
//! capabilities. Cleartext keys are never persisted.

pub mod keystore;
pub mod sealed;
pub mod signer;

pub use keystore::{GeneratedPolicy, GeneratedWallet, KeyStore};
pub use signer::Signer;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeysError {
    #[error("invalid master key: {0}")]
    InvalidMasterKey(String),

    #[error("seal error: {0}")]
    Seal(String),

    #[error("unseal failed (wrong master key or corrupted material)")]
    UnsealFailed,

    #[error("invalid sealed envelope: {0}")]
    InvalidEnvelope(String),

    #[error("address error: {0}")]
    Address(#[from] egret_types::TypesError),
}
