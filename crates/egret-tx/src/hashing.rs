//! Ledger hash functions.
//!
//! Body and auxiliary-data hashes are blake2b-256; key and script hashes
//! are blake2b-224.

use blake2b_simd::Params;

/// 32-byte blake2b digest (transaction bodies, auxiliary data).
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let hash = Params::new().hash_length(32).hash(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_bytes());
    out
}

/// 28-byte blake2b digest (verification keys, policy scripts).
pub fn blake2b_224(data: &[u8]) -> [u8; 28] {
    let hash = Params::new().hash_length(28).hash(data);
    let mut out = [0u8; 28];
    out.copy_from_slice(hash.as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lengths() {
        assert_eq!(blake2b_256(b"x").len(), 32);
        assert_eq!(blake2b_224(b"x").len(), 28);
    }

    #[test]
    fn test_deterministic_and_distinct() {
        assert_eq!(blake2b_256(b"abc"), blake2b_256(b"abc"));
        assert_ne!(blake2b_256(b"abc"), blake2b_256(b"abd"));
        assert_ne!(&blake2b_224(b"abc")[..], &blake2b_256(b"abc")[..28]);
    }
}
