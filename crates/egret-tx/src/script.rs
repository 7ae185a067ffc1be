//! Native minting scripts.
//!
//! The subset of the ledger's native script language used for minting
//! policies: a required signer, optionally wrapped with an absolute
//! time-lock, combined under all-of semantics. The policy id is the
//! blake2b-224 hash of the namespace-tagged script encoding and is
//! deterministic for a given script.

use crate::cbor::Writer;
use crate::hashing::blake2b_224;

/// Script language namespace tag prepended before hashing.
const NATIVE_SCRIPT_NAMESPACE: u8 = 0x00;

// Constructor indices in the script encoding.
const TAG_PUBKEY: u64 = 0;
const TAG_ALL: u64 = 1;
const TAG_INVALID_HEREAFTER: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeScript {
    /// Requires a signature by the key with this blake2b-224 hash.
    Pubkey([u8; 28]),
    /// All sub-scripts must be satisfied.
    All(Vec<NativeScript>),
    /// Invalid in slots strictly after this one.
    InvalidHereAfter(u64),
}

impl NativeScript {
    /// The standard minting policy shape: key signature, optionally
    /// time-locked.
    pub fn policy(key_hash: [u8; 28], locking_slot: Option<u64>) -> Self {
        let mut scripts = vec![NativeScript::Pubkey(key_hash)];
        if let Some(slot) = locking_slot {
            scripts.push(NativeScript::InvalidHereAfter(slot));
        }
        NativeScript::All(scripts)
    }

    pub fn encode(&self, w: &mut Writer) {
        match self {
            NativeScript::Pubkey(hash) => {
                w.array(2);
                w.uint(TAG_PUBKEY);
                w.bytes(hash);
            }
            NativeScript::All(scripts) => {
                w.array(2);
                w.uint(TAG_ALL);
                w.array(scripts.len());
                for s in scripts {
                    s.encode(w);
                }
            }
            NativeScript::InvalidHereAfter(slot) => {
                w.array(2);
                w.uint(TAG_INVALID_HEREAFTER);
                w.uint(*slot);
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode(&mut w);
        w.into_bytes()
    }

    /// Script hash: blake2b-224 over the namespace tag plus the encoding.
    pub fn hash(&self) -> [u8; 28] {
        let encoded = self.to_bytes();
        let mut tagged = Vec::with_capacity(1 + encoded.len());
        tagged.push(NATIVE_SCRIPT_NAMESPACE);
        tagged.extend_from_slice(&encoded);
        blake2b_224(&tagged)
    }

    /// Hex policy id for this script.
    pub fn policy_id(&self) -> String {
        hex::encode(self.hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pubkey_encoding() {
        let s = NativeScript::Pubkey([0xaa; 28]);
        let bytes = s.to_bytes();
        // [0, h'aa..'] → array(2), uint 0, bytes(28).
        assert_eq!(bytes[0], 0x82);
        assert_eq!(bytes[1], 0x00);
        assert_eq!(bytes[2], 0x58);
        assert_eq!(bytes[3], 28);
    }

    #[test]
    fn test_policy_id_is_hex_56() {
        let s = NativeScript::policy([1u8; 28], Some(42));
        let id = s.policy_id();
        assert_eq!(id.len(), 56);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_policy_id_deterministic() {
        let a = NativeScript::policy([7u8; 28], Some(100));
        let b = NativeScript::policy([7u8; 28], Some(100));
        assert_eq!(a.policy_id(), b.policy_id());
    }

    #[test]
    fn test_lock_slot_changes_policy_id() {
        let unlocked = NativeScript::policy([7u8; 28], None);
        let locked = NativeScript::policy([7u8; 28], Some(100));
        let later = NativeScript::policy([7u8; 28], Some(101));
        assert_ne!(unlocked.policy_id(), locked.policy_id());
        assert_ne!(locked.policy_id(), later.policy_id());
    }

    #[test]
    fn test_key_hash_changes_policy_id() {
        let a = NativeScript::policy([1u8; 28], None);
        let b = NativeScript::policy([2u8; 28], None);
        assert_ne!(a.policy_id(), b.policy_id());
    }

    #[test]
    fn test_policy_shape() {
        match NativeScript::policy([0u8; 28], Some(5)) {
            NativeScript::All(scripts) => {
                assert_eq!(scripts.len(), 2);
                assert!(matches!(scripts[0], NativeScript::Pubkey(_)));
                assert!(matches!(scripts[1], NativeScript::InvalidHereAfter(5)));
            }
            other => panic!("unexpected script shape: {other:?}"),
        }
    }
}
