//! Manifest key resolution.
//!
//! Resolves the secret (if any) used to authenticate manifests. Precedence,
//! each tried until one succeeds:
//!
//! 1. vault-local protected key (auto-created when `allow_init`)
//! 2. master key → purpose-specific derived key (HKDF, domain-separated)
//! 3. legacy raw manifest key (backward compatibility)
//! 4. none — manifests are integrity-checked but not authenticated
//!
//! Key material comes from an explicit [`KeyConfig`], never from ambient
//! process state, so multiple vaults and tests coexist safely. Key bytes are
//! zeroed on drop and never logged or serialized.

pub mod kdf;
pub mod vault_key;

use std::fmt;
use std::path::PathBuf;

use crate::error::{Result, VaultError};
use crate::storage::Storage;

/// Minimum acceptable key material, in bytes.
pub const MIN_KEY_BYTES: usize = 32;

/// Externally supplied master secret.
pub struct MasterKey {
    bytes: Vec<u8>,
}

impl MasterKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.iter_mut().for_each(|b| *b = 0);
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey(<{} bytes>)", self.bytes.len())
    }
}

/// The key actually used for manifest authentication.
pub struct ManifestKey {
    bytes: Vec<u8>,
}

impl ManifestKey {
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
        ManifestKey { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for ManifestKey {
    fn drop(&mut self) {
        self.bytes.iter_mut().for_each(|b| *b = 0);
    }
}

impl fmt::Debug for ManifestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ManifestKey(<{} bytes>)", self.bytes.len())
    }
}

/// Explicit key-resolution configuration.
#[derive(Debug, Clone, Default)]
pub struct KeyConfig {
    /// Vault root holding (or allowed to hold) the protected local key.
    pub vault_root: Option<PathBuf>,

    /// Allow creating a vault-local key on first use.
    pub allow_init: bool,

    /// Hex-encoded master secret, minimum 32 bytes once decoded.
    pub master_key_hex: Option<String>,

    /// Hex-encoded raw manifest key. Backward compatibility only.
    pub legacy_key_hex: Option<String>,

    /// Override for the machine-local protection secret (tests). Defaults to
    /// a per-user location under the OS config directory.
    pub machine_secret_path: Option<PathBuf>,
}

impl KeyConfig {
    /// Configuration for a vault that may self-initialize its local key.
    pub fn for_vault(vault_root: impl Into<PathBuf>) -> Self {
        KeyConfig {
            vault_root: Some(vault_root.into()),
            allow_init: true,
            ..Default::default()
        }
    }
}

/// Decode hex key material, refusing anything malformed or too short.
fn parse_hex_key(raw: &str, what: &str) -> Result<Vec<u8>> {
    let raw = raw.trim();
    let bytes = hex::decode(raw)
        .map_err(|_| VaultError::SnapshotCorrupt(format!("Invalid {what}: must be hex.")))?;
    if bytes.len() < MIN_KEY_BYTES {
        return Err(VaultError::SnapshotCorrupt(format!(
            "Invalid {what}: must be at least {MIN_KEY_BYTES} bytes."
        )));
    }
    Ok(bytes)
}

/// Parse a master key from its hex form.
pub fn parse_master_key(raw: &str) -> Result<MasterKey> {
    Ok(MasterKey {
        bytes: parse_hex_key(raw, "master key")?,
    })
}

/// Resolve the manifest key per the precedence chain.
///
/// Returns `Ok(None)` when no key material is configured at all. Key
/// material that is present but unusable is a hard failure, never a silent
/// fallback to the next source.
pub fn resolve_manifest_key(storage: &dyn Storage, config: &KeyConfig) -> Result<Option<ManifestKey>> {
    if let Some(vault_root) = &config.vault_root {
        if let Some(key) = vault_key::try_load_manifest_key(storage, vault_root, config)? {
            return Ok(Some(ManifestKey::from_bytes(key)));
        }
        if config.allow_init {
            if let Some(key) = vault_key::init_manifest_key_if_missing(storage, vault_root, config)? {
                return Ok(Some(ManifestKey::from_bytes(key)));
            }
        }
    }

    if let Some(raw) = &config.master_key_hex {
        let master = parse_master_key(raw)?;
        return Ok(Some(kdf::derive_manifest_key(&master)));
    }

    if let Some(raw) = &config.legacy_key_hex {
        return Ok(Some(ManifestKey::from_bytes(parse_hex_key(
            raw,
            "legacy manifest key",
        )?)));
    }

    Ok(None)
}
