//! Signer capabilities.

use ed25519_dalek::{Signer as _, SigningKey};
use egret_tx::hashing::blake2b_224;
use egret_tx::VKeyWitness;

/// A live signing capability for one key. Holds the cleartext key only for
/// the duration of a build; never serialized.
pub struct Signer {
    signing_key: SigningKey,
}

impl Signer {
    pub fn from_bytes(secret: [u8; 32]) -> Self {
        Signer {
            signing_key: SigningKey::from_bytes(&secret),
        }
    }

    /// Sign arbitrary bytes (a transaction body hash).
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// The 32-byte verification key.
    pub fn verification_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// blake2b-224 hash of the verification key, used in addresses and
    /// policy scripts.
    pub fn verification_key_hash(&self) -> [u8; 28] {
        blake2b_224(&self.verification_key())
    }

    /// Produce a key witness over a signed message.
    pub fn witness(&self, message: &[u8]) -> VKeyWitness {
        VKeyWitness {
            vkey: self.verification_key(),
            signature: self.sign(message),
        }
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("Signer")
            .field("vkey", &hex::encode(self.verification_key()))
            .finish()
    }
}
