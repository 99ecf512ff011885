//! Forward-compatible manifest stanza validation.
//!
//! The crypto stanza declares an encryption scheme that the engine does not
//! act on yet; it still must validate completely. Unknown schemes, versions,
//! or missing required fields refuse — fail closed, no best-effort reading.

use crate::error::{Result, VaultError};

use super::{CryptoContent, Manifest};

/// Scheme declaring no payload encryption.
pub const SCHEME_NONE: &str = "none";

/// The one declared (inert) cipher scheme the schema understands.
pub const SCHEME_AES_256_GCM: &str = "aes-256-gcm";

const ALLOWED_NONCE_POLICIES: &[&str] = &["per-file-random-12b"];

/// Validate the optional crypto stanza. Absence is fine; presence must be
/// complete and recognized.
pub fn validate_crypto_stanza(manifest: &Manifest) -> Result<()> {
    let crypto = match &manifest.crypto {
        None => return Ok(()),
        Some(crypto) => crypto,
    };

    if crypto.version != 1 {
        return Err(VaultError::SnapshotCorrupt(
            "Invalid manifest: unsupported crypto version.".to_string(),
        ));
    }

    validate_content(&crypto.content)
}

fn validate_content(content: &CryptoContent) -> Result<()> {
    if content.scheme.is_empty() {
        return Err(VaultError::SnapshotCorrupt(
            "Invalid manifest: crypto scheme must be a non-empty string.".to_string(),
        ));
    }

    match content.scheme.as_str() {
        SCHEME_NONE => Ok(()),
        SCHEME_AES_256_GCM => {
            if content.key_id.as_deref().unwrap_or("").is_empty() {
                return Err(VaultError::SnapshotCorrupt(
                    "Invalid manifest: crypto key_id must be a non-empty string.".to_string(),
                ));
            }
            if content.aad.as_deref().unwrap_or("").is_empty() {
                return Err(VaultError::SnapshotCorrupt(
                    "Invalid manifest: crypto aad must be a non-empty string.".to_string(),
                ));
            }
            match content.nonce_policy.as_deref() {
                Some(policy) if ALLOWED_NONCE_POLICIES.contains(&policy) => Ok(()),
                _ => Err(VaultError::SnapshotCorrupt(
                    "Invalid manifest: unsupported crypto nonce policy.".to_string(),
                )),
            }
        }
        // Fail closed on unknown schemes.
        _ => Err(VaultError::SnapshotCorrupt(
            "Invalid manifest: unsupported crypto scheme.".to_string(),
        )),
    }
}
