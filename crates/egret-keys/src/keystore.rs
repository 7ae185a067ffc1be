//! The key store.
//!
//! Holds the master sealing key and mediates every signing-key operation:
//! generating wallet and policy keys (returning only sealed material) and
//! unsealing stored material into [`Signer`] capabilities.

use crate::sealed;
use crate::signer::Signer;
use crate::KeysError;
use egret_tx::NativeScript;
use egret_types::address::{self, Network};
use rand::RngCore;

/// Enterprise address header: key-hash payment part, no delegation part.
const ENTERPRISE_HEADER: u8 = 0b0110_0000;

/// Result of onboarding a wallet key.
#[derive(Debug)]
pub struct GeneratedWallet {
    pub address: String,
    pub sealed_key_hex: String,
}

/// Result of creating a minting policy.
#[derive(Debug)]
pub struct GeneratedPolicy {
    pub policy_id: String,
    pub sealed_key_hex: String,
    pub locking_slot: Option<u64>,
}

pub struct KeyStore {
    master: [u8; 32],
    network: Network,
}

impl KeyStore {
    pub fn new(master: [u8; 32], network: Network) -> Self {
        KeyStore { master, network }
    }

    /// Parse a hex master key from configuration.
    pub fn from_hex(master_hex: &str, network: Network) -> Result<Self, KeysError> {
        let raw = hex::decode(master_hex)
            .map_err(|e| KeysError::InvalidMasterKey(e.to_string()))?;
        let master: [u8; 32] = raw
            .try_into()
            .map_err(|_| KeysError::InvalidMasterKey("expected 32 bytes".into()))?;
        Ok(KeyStore::new(master, network))
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Generate a wallet payment key; returns its enterprise address and the
    /// sealed key. The cleartext key never leaves this function.
    pub fn generate_wallet(&self) -> Result<GeneratedWallet, KeysError> {
        let secret = random_secret();
        let signer = Signer::from_bytes(secret);

        let mut payload = Vec::with_capacity(29);
        payload.push(ENTERPRISE_HEADER | self.network.id());
        payload.extend_from_slice(&signer.verification_key_hash());
        let address = address::encode(self.network.hrp(), &payload)?;

        let sealed_key_hex = hex::encode(sealed::seal(&self.master, &secret)?);
        log::info!("generated wallet key for address {address}");
        Ok(GeneratedWallet {
            address,
            sealed_key_hex,
        })
    }

    /// Generate a minting policy key and its script identity.
    pub fn generate_policy(
        &self,
        locking_slot: Option<u64>,
    ) -> Result<GeneratedPolicy, KeysError> {
        let secret = random_secret();
        let signer = Signer::from_bytes(secret);

        let script = NativeScript::policy(signer.verification_key_hash(), locking_slot);
        let policy_id = script.policy_id();

        let sealed_key_hex = hex::encode(sealed::seal(&self.master, &secret)?);
        log::info!("generated minting policy {policy_id}");
        Ok(GeneratedPolicy {
            policy_id,
            sealed_key_hex,
            locking_slot,
        })
    }

    /// Unseal stored key material into a signing capability.
    pub fn signer_for(&self, sealed_key_hex: &str) -> Result<Signer, KeysError> {
        let sealed_bytes = hex::decode(sealed_key_hex)
            .map_err(|e| KeysError::InvalidEnvelope(e.to_string()))?;
        let plaintext = sealed::unseal(&self.master, &sealed_bytes)?;
        let secret: [u8; 32] = plaintext
            .try_into()
            .map_err(|_| KeysError::InvalidEnvelope("expected 32-byte key".into()))?;
        Ok(Signer::from_bytes(secret))
    }
}

fn random_secret() -> [u8; 32] {
    let mut secret = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}
