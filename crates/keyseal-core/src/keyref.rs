//! Stable key reference derivation.
//!
//! The reference names a key both in the legacy session keyring and as the
//! descriptor of a v1 encryption policy, so it must be deterministic for the
//! lifetime of the key: install and evict address the kernel with the same
//! bytes.

use keyseal_provider::KEY_DESCRIPTOR_SIZE;
use sha2::{Digest, Sha512};

/// Derive the stable reference for `key`: the leading bytes of a double
/// SHA-512 of the key material.
pub fn derive_key_reference(key: &[u8]) -> [u8; KEY_DESCRIPTOR_SIZE] {
    let first = Sha512::digest(key);
    let second = Sha512::digest(first);
    let mut reference = [0u8; KEY_DESCRIPTOR_SIZE];
    reference.copy_from_slice(&second[..KEY_DESCRIPTOR_SIZE]);
    reference
}

/// Hex rendering of a raw key reference for logs and operator output.
pub fn key_ref_display(raw_ref: &[u8]) -> String {
    hex::encode(raw_ref)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let key = [0x42u8; 64];
        assert_eq!(derive_key_reference(&key), derive_key_reference(&key));
    }

    #[test]
    fn distinct_keys_yield_distinct_references() {
        let mut other = [0x42u8; 64];
        other[63] ^= 1;
        assert_ne!(derive_key_reference(&[0x42u8; 64]), derive_key_reference(&other));
    }

    #[test]
    fn reference_is_descriptor_sized() {
        assert_eq!(derive_key_reference(b"short").len(), KEY_DESCRIPTOR_SIZE);
    }

    #[test]
    fn display_is_lowercase_hex() {
        let rendered = key_ref_display(&[0xAB, 0x01, 0xFF]);
        assert_eq!(rendered, "ab01ff");
    }
}
