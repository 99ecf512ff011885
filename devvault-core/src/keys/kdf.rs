//! Manifest key derivation (HKDF-SHA256).
//!
//! The salt and info strings are fixed and versioned: the same master key
//! always yields the same manifest key, and bumping the context string at a
//! future version yields an unrelated key from the same master (explicit
//! domain separation).

use hkdf::Hkdf;
use sha2::Sha256;

use super::{ManifestKey, MasterKey};

/// Versioned derivation salt. Changing this is a key rotation.
const KDF_SALT: &[u8] = b"devvault:v1";

/// Purpose tag for the manifest HMAC key.
const KDF_INFO: &[u8] = b"manifest-hmac-sha256:v1";

/// Derived key length: 32 bytes for HMAC-SHA256.
const DERIVED_LEN: usize = 32;

/// Derive the purpose-specific manifest key from a master secret.
pub fn derive_manifest_key(master: &MasterKey) -> ManifestKey {
    let hk = Hkdf::<Sha256>::new(Some(KDF_SALT), master.as_bytes());
    let mut okm = vec![0u8; DERIVED_LEN];
    // DERIVED_LEN is far below the HKDF-SHA256 output bound; expand cannot fail.
    hk.expand(KDF_INFO, &mut okm)
        .expect("HKDF expand with 32-byte output");
    ManifestKey::from_bytes(okm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::parse_master_key;

    #[test]
    fn derivation_is_deterministic() {
        let master = parse_master_key(&hex::encode([7u8; 32])).unwrap();
        let a = derive_manifest_key(&master);
        let b = derive_manifest_key(&master);
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_eq!(a.as_bytes().len(), 32);
    }

    #[test]
    fn different_masters_yield_unrelated_keys() {
        let a = derive_manifest_key(&parse_master_key(&hex::encode([1u8; 32])).unwrap());
        let b = derive_manifest_key(&parse_master_key(&hex::encode([2u8; 32])).unwrap());
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn derived_key_differs_from_master() {
        let master = parse_master_key(&hex::encode([9u8; 32])).unwrap();
        let derived = derive_manifest_key(&master);
        assert_ne!(derived.as_bytes(), master.as_bytes());
    }
}
