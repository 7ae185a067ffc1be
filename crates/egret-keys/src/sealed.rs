//! Sealed key envelopes.
//!
//! AES-256-GCM under the operator-supplied master key. The envelope is
//! self-contained: magic, format version, random nonce, ciphertext. Stored
//! hex-encoded in the wallet and policy tables.

use crate::KeysError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

/// Magic bytes identifying a sealed Egret key.
const MAGIC: &[u8; 4] = b"EGRK";

/// Current envelope format version.
const VERSION: u8 = 1;

/// Header size: 4 (magic) + 1 (version) + 12 (nonce).
const HEADER_SIZE: usize = 17;

/// Seal plaintext key material under the master key.
pub fn seal(master: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, KeysError> {
    let mut nonce_bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let key = Key::<Aes256Gcm>::from_slice(master);
    let cipher = Aes256Gcm::new(key);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| KeysError::Seal(e.to_string()))?;

    let mut out = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a sealed envelope.
pub fn unseal(master: &[u8; 32], sealed: &[u8]) -> Result<Vec<u8>, KeysError> {
    if sealed.len() <= HEADER_SIZE {
        return Err(KeysError::InvalidEnvelope("too short".into()));
    }
    if &sealed[0..4] != MAGIC {
        return Err(KeysError::InvalidEnvelope("bad magic".into()));
    }
    let version = sealed[4];
    if version != VERSION {
        return Err(KeysError::InvalidEnvelope(format!(
            "unsupported version {version}"
        )));
    }

    let nonce_bytes = &sealed[5..17];
    let ciphertext = &sealed[17..];

    let key = Key::<Aes256Gcm>::from_slice(master);
    let cipher = Aes256Gcm::new(key);
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| KeysError::UnsealFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: [u8; 32] = [0x42; 32];

    #[test]
    fn test_seal_unseal_roundtrip() {
        let sealed = seal(&MASTER, b"key material").unwrap();
        assert_eq!(&sealed[0..4], MAGIC);
        assert_eq!(sealed[4], VERSION);
        assert_eq!(unseal(&MASTER, &sealed).unwrap(), b"key material");
    }

    #[test]
    fn test_wrong_master_fails() {
        let sealed = seal(&MASTER, b"secret").unwrap();
        let wrong = [0x43; 32];
        assert!(matches!(
            unseal(&wrong, &sealed),
            Err(KeysError::UnsealFailed)
        ));
    }

    #[test]
    fn test_envelopes_are_randomized() {
        let a = seal(&MASTER, b"same").unwrap();
        let b = seal(&MASTER, b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_truncated_rejected() {
        assert!(matches!(
            unseal(&MASTER, &[0u8; 5]),
            Err(KeysError::InvalidEnvelope(_))
        ));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut sealed = seal(&MASTER, b"x").unwrap();
        sealed[0] = b'X';
        assert!(matches!(
            unseal(&MASTER, &sealed),
            Err(KeysError::InvalidEnvelope(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let mut sealed = seal(&MASTER, b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(matches!(
            unseal(&MASTER, &sealed),
            Err(KeysError::UnsealFailed)
        ));
    }
}
