//! Restore engine.
//!
//! Every manifest entry is validated before any destination write begins.
//! The apply loop itself is per-file atomic (temp copy, re-hash, rename)
//! but not transactional across entries: an interruption leaves already
//! promoted files in place and unwritten ones absent. Retrying requires an
//! empty destination again, which the precondition re-checks.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::digest::hash_path;
use crate::error::{Result, VaultError};
use crate::keys::KeyConfig;
use crate::storage::Storage;

use super::pipeline::{validate_snapshot, ValidEntry};
use super::is_staging_path;

/// Suffix for in-flight per-file temp copies in the destination.
const RESTORE_TMP_SUFFIX: &str = ".devvault.tmp";

#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub snapshot_dir: PathBuf,
    pub destination_dir: PathBuf,
}

pub struct RestoreEngine<'a> {
    storage: &'a dyn Storage,
    keys: KeyConfig,
}

impl<'a> RestoreEngine<'a> {
    pub fn new(storage: &'a dyn Storage, keys: KeyConfig) -> Self {
        RestoreEngine { storage, keys }
    }

    /// Restore a snapshot into an empty (or absent) destination directory.
    pub fn restore(&self, request: &RestoreRequest) -> Result<()> {
        self.check_snapshot_selection(&request.snapshot_dir)?;
        self.check_destination(&request.destination_dir)?;

        let validated = validate_snapshot(self.storage, &request.snapshot_dir, &self.keys)?;

        info!(
            snapshot = %request.snapshot_dir.display(),
            files = validated.entries.len(),
            "restore preflight passed; applying"
        );

        if !self.storage.exists(&request.destination_dir) {
            self.storage.create_dir_all(&request.destination_dir)?;
        }

        for entry in &validated.entries {
            self.apply_entry(&request.destination_dir, entry)?;
        }

        info!(files = validated.entries.len(), "restore complete");
        Ok(())
    }

    fn check_snapshot_selection(&self, snapshot_dir: &Path) -> Result<()> {
        if !self.storage.exists(snapshot_dir) {
            return Err(VaultError::RestoreRefused(format!(
                "Snapshot directory does not exist: {}",
                snapshot_dir.display()
            )));
        }
        if !self.storage.is_dir(snapshot_dir) {
            return Err(VaultError::RestoreRefused(format!(
                "Snapshot path is not a directory: {}",
                snapshot_dir.display()
            )));
        }
        if is_staging_path(snapshot_dir) {
            return Err(VaultError::RestoreRefused(
                "Refusing to restore from an incomplete snapshot.".to_string(),
            ));
        }
        Ok(())
    }

    fn check_destination(&self, destination: &Path) -> Result<()> {
        if !self.storage.exists(destination) {
            return Ok(());
        }
        if !self.storage.is_dir(destination) {
            return Err(VaultError::RestoreRefused(format!(
                "Destination exists but is not a directory: {}",
                destination.display()
            )));
        }
        if !self.storage.list_dir(destination)?.is_empty() {
            return Err(VaultError::RestoreRefused(format!(
                "Destination directory must be empty: {}",
                destination.display()
            )));
        }
        Ok(())
    }

    /// Copy one entry: temp sibling, re-hash, rename on match. Legacy
    /// entries (no digest) copy directly.
    fn apply_entry(&self, destination: &Path, entry: &ValidEntry) -> Result<()> {
        let target = destination.join(&entry.relative_path);
        if let Some(parent) = target.parent() {
            self.storage.create_dir_all(parent)?;
        }

        let expected = match &entry.digest_hex {
            Some(expected) => expected,
            None => {
                self.storage.copy_file(&entry.stored_path, &target)?;
                return Ok(());
            }
        };

        let mut tmp_name = target.clone().into_os_string();
        tmp_name.push(RESTORE_TMP_SUFFIX);
        let tmp = PathBuf::from(tmp_name);

        self.storage.copy_file(&entry.stored_path, &tmp)?;

        let actual = match hash_path(self.storage, &tmp) {
            Ok(digest) => digest,
            Err(err) => {
                let _ = self.storage.remove_file(&tmp);
                return Err(err);
            }
        };
        if actual.hex != *expected {
            let _ = self.storage.remove_file(&tmp);
            return Err(VaultError::SnapshotCorrupt(format!(
                "Restore verification failed for '{}': checksum mismatch.",
                entry.relative_path.display()
            )));
        }

        self.storage.rename(&tmp, &target)?;
        debug!(path = %entry.relative_path.display(), "restored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::hash_bytes;
    use crate::engine::{BackupEngine, BackupRequest};
    use crate::manifest::test_support::write_signed;
    use crate::manifest::FileEntry;
    use crate::storage::MemStorage;

    fn backed_up_snapshot(storage: &MemStorage) -> PathBuf {
        storage.put_file(Path::new("/src/a.txt"), b"hello");
        storage.put_file(Path::new("/src/dir/b.bin"), b"\x01\x02\x03\x04");
        let engine = BackupEngine::new(storage, KeyConfig::default());
        engine
            .execute(&BackupRequest::new("/src", "/vault"))
            .unwrap()
            .backup_path
    }

    fn restore_request(snapshot: &Path) -> RestoreRequest {
        RestoreRequest {
            snapshot_dir: snapshot.to_path_buf(),
            destination_dir: PathBuf::from("/restored"),
        }
    }

    #[test]
    fn round_trip_reproduces_paths_and_bytes() {
        let storage = MemStorage::new();
        let snapshot = backed_up_snapshot(&storage);

        let engine = RestoreEngine::new(&storage, KeyConfig::default());
        engine.restore(&restore_request(&snapshot)).unwrap();

        assert_eq!(
            storage.file_contents(Path::new("/restored/a.txt")).unwrap(),
            b"hello"
        );
        assert_eq!(
            storage
                .file_contents(Path::new("/restored/dir/b.bin"))
                .unwrap(),
            b"\x01\x02\x03\x04"
        );
        // No temp files left behind.
        let children = storage.list_dir(Path::new("/restored")).unwrap();
        assert!(children
            .iter()
            .all(|c| !c.to_string_lossy().ends_with(RESTORE_TMP_SUFFIX)));
    }

    #[test]
    fn non_empty_destination_refuses_and_stays_unchanged() {
        let storage = MemStorage::new();
        let snapshot = backed_up_snapshot(&storage);
        storage.put_file(Path::new("/restored/existing.txt"), b"keep me");

        let engine = RestoreEngine::new(&storage, KeyConfig::default());
        let err = engine.restore(&restore_request(&snapshot)).unwrap_err();

        assert!(matches!(err, VaultError::RestoreRefused(_)));
        assert_eq!(
            storage
                .file_contents(Path::new("/restored/existing.txt"))
                .unwrap(),
            b"keep me"
        );
        assert_eq!(storage.list_dir(Path::new("/restored")).unwrap().len(), 1);
    }

    #[test]
    fn staging_snapshot_refuses() {
        let storage = MemStorage::new();
        storage
            .create_dir_all(Path::new("/vault/.incomplete-20250101T000000Z-deadbeef"))
            .unwrap();

        let engine = RestoreEngine::new(&storage, KeyConfig::default());
        let err = engine
            .restore(&restore_request(Path::new(
                "/vault/.incomplete-20250101T000000Z-deadbeef",
            )))
            .unwrap_err();
        assert!(err.to_string().contains("incomplete"));
    }

    #[test]
    fn tampered_stored_file_refuses_at_apply_and_cleans_temp() {
        let storage = MemStorage::new();
        let snapshot = backed_up_snapshot(&storage);
        // Same length, different bytes, so only the digest catches it.
        storage.put_file(&snapshot.join("a.txt"), b"hellO");

        let engine = RestoreEngine::new(&storage, KeyConfig::default());
        let err = engine.restore(&restore_request(&snapshot)).unwrap_err();

        assert!(err.to_string().contains("checksum mismatch"));
        assert!(!storage.exists(Path::new("/restored/a.txt")));
        let children = storage.list_dir(Path::new("/restored")).unwrap();
        assert!(children
            .iter()
            .all(|c| !c.to_string_lossy().ends_with(RESTORE_TMP_SUFFIX)));
    }

    #[test]
    fn truncated_stored_file_refuses_before_any_write() {
        let storage = MemStorage::new();
        let snapshot = backed_up_snapshot(&storage);
        storage.put_file(&snapshot.join("dir/b.bin"), b"\x01\x02");

        let engine = RestoreEngine::new(&storage, KeyConfig::default());
        let err = engine.restore(&restore_request(&snapshot)).unwrap_err();

        assert!(err.to_string().contains("Size mismatch"));
        assert!(!storage.exists(Path::new("/restored")));
    }

    #[test]
    fn traversal_entry_refuses_before_any_write() {
        let storage = MemStorage::new();
        let snap = PathBuf::from("/vault/snap");
        storage.put_file(&snap.join("a.txt"), b"hello");
        write_signed(
            &storage,
            &snap,
            vec![FileEntry {
                path: "../escape.txt".to_string(),
                size: 5,
                entry_type: "file".to_string(),
                digest_hex: Some(hash_bytes(b"hello")),
            }],
        );

        let engine = RestoreEngine::new(&storage, KeyConfig::default());
        let err = engine.restore(&restore_request(&snap)).unwrap_err();

        assert!(err.to_string().contains("unsafe path"));
        assert!(!storage.exists(Path::new("/restored")));
        assert!(!storage.exists(Path::new("/escape.txt")));
    }

    #[test]
    fn keyed_manifest_with_no_key_refuses() {
        let storage = MemStorage::new();
        storage.put_file(Path::new("/src/a.txt"), b"hello");

        let keyed = KeyConfig {
            legacy_key_hex: Some(hex::encode([0x5a; 32])),
            ..Default::default()
        };
        let backup = BackupEngine::new(&storage, keyed);
        let snapshot = backup
            .execute(&BackupRequest::new("/src", "/vault"))
            .unwrap()
            .backup_path;

        let engine = RestoreEngine::new(&storage, KeyConfig::default());
        let err = engine.restore(&restore_request(&snapshot)).unwrap_err();

        assert!(matches!(err, VaultError::SnapshotCorrupt(_)));
        assert!(err.to_string().contains("integrity check failed"));
    }

    #[test]
    fn legacy_manifest_restores_without_digest_check() {
        let storage = MemStorage::new();
        let snap = PathBuf::from("/vault/snap");
        storage.put_file(&snap.join("a.txt"), b"hello");
        crate::manifest::test_support::write_signed_manifest(
            &storage,
            &snap,
            crate::manifest::Manifest {
                manifest_version: crate::manifest::MANIFEST_VERSION_LEGACY,
                checksum_algo: None,
                files: vec![FileEntry {
                    path: "a.txt".to_string(),
                    size: 5,
                    entry_type: "file".to_string(),
                    digest_hex: None,
                }],
                crypto: None,
                manifest_integrity: None,
            },
        );

        let engine = RestoreEngine::new(&storage, KeyConfig::default());
        engine.restore(&restore_request(&snap)).unwrap();
        assert_eq!(
            storage.file_contents(Path::new("/restored/a.txt")).unwrap(),
            b"hello"
        );
    }

    // The apply loop is per-file atomic but not transactional across
    // entries: a mid-loop failure keeps files promoted before it.
    #[test]
    fn partial_apply_keeps_promoted_entries() {
        let storage = MemStorage::new();
        let snapshot = backed_up_snapshot(&storage);
        // Corrupt only the second entry (sorted order: a.txt, dir/b.bin)
        // without changing its size.
        storage.put_file(&snapshot.join("dir/b.bin"), b"\x09\x09\x09\x09");

        let engine = RestoreEngine::new(&storage, KeyConfig::default());
        let err = engine.restore(&restore_request(&snapshot)).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));

        // The first entry was already promoted; the failed one is absent.
        assert_eq!(
            storage.file_contents(Path::new("/restored/a.txt")).unwrap(),
            b"hello"
        );
        assert!(!storage.exists(Path::new("/restored/dir/b.bin")));
    }
}
