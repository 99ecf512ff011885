//! Manifest integrity: plain digest or keyed MAC over the canonical payload.
//!
//! The digest always covers the manifest with the integrity block stripped.
//! Verification fails closed: an unsupported algorithm tag or a keyed
//! algorithm with no resolvable key is a hard failure, never a silent
//! downgrade to unauthenticated.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::digest::hash_bytes;
use crate::error::{Result, VaultError};
use crate::keys::ManifestKey;

use super::{canonical_payload_bytes, IntegrityBlock, Manifest};

/// Algorithm tag for unkeyed integrity.
pub const ALGO_SHA256: &str = "sha256";

/// Algorithm tag for keyed integrity.
pub const ALGO_HMAC_SHA256: &str = "hmac-sha256";

type HmacSha256 = Hmac<Sha256>;

/// Outcome of a successful integrity verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityStatus {
    /// Block present and it matched.
    Verified,
    /// No block at all; valid but unauthenticated (legacy manifests).
    Unauthenticated,
}

fn hmac_hex(data: &[u8], key: &ManifestKey) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).map_err(|_| {
        VaultError::InvariantViolation("manifest key rejected by HMAC".to_string())
    })?;
    mac.update(data);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Return a new manifest with an integrity block attached: hmac-sha256 when
/// a key is present, plain sha256 otherwise.
pub fn add_integrity_block(manifest: &Manifest, key: Option<&ManifestKey>) -> Result<Manifest> {
    let mut signed = manifest.clone();
    signed.manifest_integrity = None;
    let payload = canonical_payload_bytes(&signed)?;

    let (algo, digest_hex) = match key {
        Some(key) => (ALGO_HMAC_SHA256, hmac_hex(&payload, key)?),
        None => (ALGO_SHA256, hash_bytes(&payload)),
    };

    signed.manifest_integrity = Some(IntegrityBlock {
        algo: algo.to_string(),
        digest_hex,
    });
    Ok(signed)
}

/// Verify the integrity block if present.
///
/// Absence of a block is treated as valid-but-unauthenticated for backward
/// compatibility; every other ambiguity refuses.
pub fn verify_integrity(manifest: &Manifest, key: Option<&ManifestKey>) -> Result<IntegrityStatus> {
    let block = match &manifest.manifest_integrity {
        None => return Ok(IntegrityStatus::Unauthenticated),
        Some(block) => block,
    };

    if block.digest_hex.len() != 64 || !block.digest_hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(VaultError::SnapshotCorrupt(
            "Invalid manifest: malformed integrity digest.".to_string(),
        ));
    }

    let payload = canonical_payload_bytes(manifest)?;

    let expected = match block.algo.as_str() {
        ALGO_SHA256 => hash_bytes(&payload),
        ALGO_HMAC_SHA256 => match key {
            Some(key) => hmac_hex(&payload, key)?,
            None => {
                return Err(VaultError::SnapshotCorrupt(
                    "Invalid manifest: integrity check failed (keyed manifest, no key available)."
                        .to_string(),
                ))
            }
        },
        other => {
            return Err(VaultError::SnapshotCorrupt(format!(
                "Invalid manifest: unsupported integrity algorithm '{other}'."
            )))
        }
    };

    if expected != block.digest_hex {
        return Err(VaultError::SnapshotCorrupt(
            "Invalid manifest: integrity check failed.".to_string(),
        ));
    }

    Ok(IntegrityStatus::Verified)
}
