//! Vault-local protected key storage.
//!
//! A randomly generated manifest key lives inside the vault at
//! `.devvault/manifest_hmac_key.enc.b64`, AES-256-GCM-protected under a
//! machine-local secret kept outside the vault. Copying the vault to another
//! machine leaves the blob undecryptable, which is the property that
//! matters. A present-but-undecryptable or too-short key is a hard failure;
//! it is never silently regenerated.

use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::{Result, VaultError};
use crate::storage::Storage;

use super::KeyConfig;

/// Housekeeping directory under the vault root.
pub const VAULT_META_DIR: &str = ".devvault";

const KEY_FILE_NAME: &str = "manifest_hmac_key.enc.b64";
const NONCE_SIZE: usize = 12;
const KEY_LEN: usize = 32;

/// Location of the protected key blob for a vault.
pub fn vault_key_path(vault_root: &Path) -> PathBuf {
    vault_root.join(VAULT_META_DIR).join(KEY_FILE_NAME)
}

/// Read (or create on first use) the machine-local protection secret.
///
/// Lives under the OS config dir by default, outside any vault, so the
/// protected blob inside a vault is useless without this machine.
fn machine_secret(config: &KeyConfig) -> Result<Vec<u8>> {
    let path = match &config.machine_secret_path {
        Some(p) => p.clone(),
        None => directories::ProjectDirs::from("", "", "devvault")
            .ok_or_else(|| {
                VaultError::VaultUnavailable(
                    "No home directory; cannot locate machine protection secret.".to_string(),
                )
            })?
            .config_dir()
            .join("machine.key"),
    };

    if path.exists() {
        let secret = fs::read(&path)?;
        if secret.len() < KEY_LEN {
            return Err(VaultError::SnapshotCorrupt(
                "Machine protection secret is invalid (too short); refusing.".to_string(),
            ));
        }
        return Ok(secret[..KEY_LEN].to_vec());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut secret = vec![0u8; KEY_LEN];
    OsRng.fill_bytes(&mut secret);
    fs::write(&path, &secret)?;
    Ok(secret)
}

fn cipher_for(secret: &[u8]) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(secret).map_err(|_| {
        VaultError::InvariantViolation("machine secret has wrong length for AES-256".to_string())
    })
}

/// Protect key bytes: base64(nonce || ciphertext).
fn protect(plaintext: &[u8], secret: &[u8]) -> Result<String> {
    let cipher = cipher_for(secret)?;
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher.encrypt(nonce, plaintext).map_err(|_| {
        VaultError::InvariantViolation("vault key protection failed".to_string())
    })?;

    let mut blob = nonce_bytes.to_vec();
    blob.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(blob))
}

/// Reverse of [`protect`]; any failure refuses rather than regenerating.
fn unprotect(encoded: &str, secret: &[u8]) -> Result<Vec<u8>> {
    let blob = BASE64.decode(encoded.trim()).map_err(|_| {
        VaultError::SnapshotCorrupt("Vault key file is invalid base64; refusing.".to_string())
    })?;
    if blob.len() <= NONCE_SIZE {
        return Err(VaultError::SnapshotCorrupt(
            "Vault key file is truncated; refusing.".to_string(),
        ));
    }

    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_SIZE);
    let cipher = cipher_for(secret)?;
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| {
            VaultError::SnapshotCorrupt(
                "Vault-managed key could not be unprotected; refusing.".to_string(),
            )
        })
}

/// Load the vault-local manifest key if its blob exists.
///
/// Returns `Ok(None)` only when no blob is present at all.
pub fn try_load_manifest_key(
    storage: &dyn Storage,
    vault_root: &Path,
    config: &KeyConfig,
) -> Result<Option<Vec<u8>>> {
    let key_path = vault_key_path(vault_root);
    if !storage.exists(&key_path) {
        return Ok(None);
    }

    let raw = storage.read_to_string(&key_path)?;
    if raw.trim().is_empty() {
        return Err(VaultError::SnapshotCorrupt(
            "Vault key file is empty; refusing.".to_string(),
        ));
    }

    let key = unprotect(&raw, &machine_secret(config)?)?;
    if key.len() < KEY_LEN {
        return Err(VaultError::SnapshotCorrupt(
            "Vault-managed key is invalid (too short); refusing.".to_string(),
        ));
    }
    Ok(Some(key[..KEY_LEN].to_vec()))
}

/// Create the vault-local key on first use; loads the existing one if a
/// blob already exists. The blob is written atomically (temp then rename).
pub fn init_manifest_key_if_missing(
    storage: &dyn Storage,
    vault_root: &Path,
    config: &KeyConfig,
) -> Result<Option<Vec<u8>>> {
    let key_path = vault_key_path(vault_root);
    if storage.exists(&key_path) {
        return try_load_manifest_key(storage, vault_root, config);
    }

    storage.create_dir_all(&vault_root.join(VAULT_META_DIR))?;

    let mut key = vec![0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    let encoded = protect(&key, &machine_secret(config)?)?;

    let tmp_path = key_path.with_extension("b64.tmp");
    storage.write_string(&tmp_path, &encoded)?;
    storage.rename(&tmp_path, &key_path)?;

    tracing::info!(vault = %vault_root.display(), "initialized vault-local manifest key");
    Ok(Some(key))
}
