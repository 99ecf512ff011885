//! Verify engine.
//!
//! Runs the same validation pipeline as restore and then re-hashes every
//! stored file against its manifest digest. Reads only; a snapshot that
//! passes verify is guaranteed restorable at this instant.

use std::path::PathBuf;

use tracing::info;

use crate::digest::hash_path;
use crate::error::{Result, VaultError};
use crate::keys::KeyConfig;
use crate::storage::Storage;

use super::is_staging_path;
use super::pipeline::validate_snapshot;

#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub snapshot_dir: PathBuf,
}

#[derive(Debug)]
pub struct VerifyResult {
    pub snapshot_dir: PathBuf,
    pub files_verified: usize,
}

pub struct VerifyEngine<'a> {
    storage: &'a dyn Storage,
    keys: KeyConfig,
}

impl<'a> VerifyEngine<'a> {
    pub fn new(storage: &'a dyn Storage, keys: KeyConfig) -> Self {
        VerifyEngine { storage, keys }
    }

    /// Verify every file in a snapshot against its manifest.
    pub fn verify(&self, request: &VerifyRequest) -> Result<VerifyResult> {
        let snapshot_dir = &request.snapshot_dir;
        if !self.storage.exists(snapshot_dir) {
            return Err(VaultError::SnapshotCorrupt(format!(
                "Snapshot directory does not exist: {}",
                snapshot_dir.display()
            )));
        }
        if !self.storage.is_dir(snapshot_dir) {
            return Err(VaultError::SnapshotCorrupt(format!(
                "Snapshot path is not a directory: {}",
                snapshot_dir.display()
            )));
        }
        if is_staging_path(snapshot_dir) {
            return Err(VaultError::SnapshotCorrupt(
                "Refusing to verify an incomplete snapshot.".to_string(),
            ));
        }

        let validated = validate_snapshot(self.storage, snapshot_dir, &self.keys)?;

        let mut files_verified = 0usize;
        for entry in &validated.entries {
            if let Some(expected) = &entry.digest_hex {
                let actual = hash_path(self.storage, &entry.stored_path)?;
                if actual.hex != *expected {
                    return Err(VaultError::SnapshotCorrupt(format!(
                        "Checksum mismatch for '{}'.",
                        entry.relative_path.display()
                    )));
                }
            }
            files_verified += 1;
        }

        info!(
            snapshot = %snapshot_dir.display(),
            files = files_verified,
            "verify passed"
        );
        Ok(VerifyResult {
            snapshot_dir: snapshot_dir.clone(),
            files_verified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BackupEngine, BackupRequest};
    use crate::storage::MemStorage;
    use std::path::Path;

    fn backed_up_snapshot(storage: &MemStorage) -> PathBuf {
        storage.put_file(Path::new("/src/a.txt"), b"hello");
        storage.put_file(Path::new("/src/dir/b.bin"), b"\x01\x02\x03\x04");
        let engine = BackupEngine::new(storage, KeyConfig::default());
        engine
            .execute(&BackupRequest::new("/src", "/vault"))
            .unwrap()
            .backup_path
    }

    #[test]
    fn fresh_snapshot_verifies_every_file() {
        let storage = MemStorage::new();
        let snapshot = backed_up_snapshot(&storage);

        let engine = VerifyEngine::new(&storage, KeyConfig::default());
        let result = engine
            .verify(&VerifyRequest {
                snapshot_dir: snapshot,
            })
            .unwrap();
        assert_eq!(result.files_verified, 2);
    }

    #[test]
    fn flipped_byte_in_stored_content_refuses() {
        let storage = MemStorage::new();
        let snapshot = backed_up_snapshot(&storage);
        storage.put_file(&snapshot.join("a.txt"), b"hellO");

        let engine = VerifyEngine::new(&storage, KeyConfig::default());
        let err = engine
            .verify(&VerifyRequest {
                snapshot_dir: snapshot,
            })
            .unwrap_err();
        assert!(err.to_string().contains("Checksum mismatch"));
    }

    #[test]
    fn truncated_stored_file_is_a_size_mismatch() {
        let storage = MemStorage::new();
        let snapshot = backed_up_snapshot(&storage);
        storage.put_file(&snapshot.join("dir/b.bin"), b"\x01\x02");

        let engine = VerifyEngine::new(&storage, KeyConfig::default());
        let err = engine
            .verify(&VerifyRequest {
                snapshot_dir: snapshot,
            })
            .unwrap_err();
        assert!(err.to_string().contains("Size mismatch"));
    }

    #[test]
    fn tampered_manifest_field_refuses() {
        let storage = MemStorage::new();
        let snapshot = backed_up_snapshot(&storage);

        // Rewrite the manifest with one size changed, leaving the stale
        // integrity block in place.
        let manifest_path = snapshot.join(crate::manifest::MANIFEST_FILE_NAME);
        let raw = storage.read_to_string(&manifest_path).unwrap();
        let tampered = raw.replacen("\"size\": 5", "\"size\": 6", 1);
        assert_ne!(raw, tampered);
        storage.write_string(&manifest_path, &tampered).unwrap();

        let engine = VerifyEngine::new(&storage, KeyConfig::default());
        let err = engine
            .verify(&VerifyRequest {
                snapshot_dir: snapshot,
            })
            .unwrap_err();
        assert!(err.to_string().contains("integrity check failed"));
    }

    #[test]
    fn staging_directory_refuses() {
        let storage = MemStorage::new();
        storage
            .create_dir_all(Path::new("/vault/.incomplete-20250101T000000Z-deadbeef"))
            .unwrap();

        let engine = VerifyEngine::new(&storage, KeyConfig::default());
        let err = engine
            .verify(&VerifyRequest {
                snapshot_dir: PathBuf::from("/vault/.incomplete-20250101T000000Z-deadbeef"),
            })
            .unwrap_err();
        assert!(err.to_string().contains("incomplete"));
    }
}
