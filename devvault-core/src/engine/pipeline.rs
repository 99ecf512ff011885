//! Shared snapshot validation pipeline.
//!
//! Restore and verify run exactly this sequence before touching any bytes:
//! manifest load, integrity verification, schema validation, then per-entry
//! safety and existence checks. Every entry is vetted before any caller
//! writes or hashes anything; an entry that survives is safe to act on.

use std::path::{Component, Path, PathBuf};

use crate::digest::CHECKSUM_ALGO;
use crate::error::{Result, VaultError};
use crate::keys::{resolve_manifest_key, KeyConfig};
use crate::manifest::{
    integrity, load_manifest, schema, FileEntry, Manifest, MANIFEST_FILE_NAME,
    MANIFEST_VERSION_DIGEST, MANIFEST_VERSION_LEGACY,
};
use crate::storage::Storage;

/// One manifest entry that passed every check.
#[derive(Debug, Clone)]
pub struct ValidEntry {
    /// Manifest-relative path, already vetted against traversal.
    pub relative_path: PathBuf,

    /// Full path of the stored file inside the snapshot.
    pub stored_path: PathBuf,

    pub size: u64,

    /// Expected content digest; `None` only for legacy manifests.
    pub digest_hex: Option<String>,
}

/// A snapshot whose manifest and entries all passed the pipeline.
#[derive(Debug)]
pub struct ValidatedSnapshot {
    pub manifest: Manifest,
    pub entries: Vec<ValidEntry>,
}

/// Validate a snapshot from its manifest inward.
///
/// The caller has already established that `snapshot_dir` exists, is a
/// directory, and is not a staging directory. Key resolution never creates
/// key material here; a keyed manifest with no resolvable key is a refusal,
/// not an invitation to initialize one.
pub fn validate_snapshot(
    storage: &dyn Storage,
    snapshot_dir: &Path,
    keys: &KeyConfig,
) -> Result<ValidatedSnapshot> {
    let manifest_path = snapshot_dir.join(MANIFEST_FILE_NAME);
    if !storage.is_file(&manifest_path) {
        return Err(VaultError::SnapshotCorrupt(
            "Snapshot is missing manifest.json; refusing.".to_string(),
        ));
    }

    let manifest = load_manifest(storage, &manifest_path)?;

    let read_only_keys = KeyConfig {
        allow_init: false,
        ..keys.clone()
    };
    let key = resolve_manifest_key(storage, &read_only_keys)?;
    integrity::verify_integrity(&manifest, key.as_ref())?;
    schema::validate_crypto_stanza(&manifest)?;

    match manifest.manifest_version {
        MANIFEST_VERSION_LEGACY => {}
        MANIFEST_VERSION_DIGEST => {
            if manifest.checksum_algo.as_deref() != Some(CHECKSUM_ALGO) {
                return Err(VaultError::SnapshotCorrupt(
                    "Invalid manifest: unsupported checksum algorithm.".to_string(),
                ));
            }
        }
        other => {
            return Err(VaultError::SnapshotCorrupt(format!(
                "Invalid manifest: unsupported manifest_version {other}."
            )))
        }
    }

    let mut entries = Vec::with_capacity(manifest.files.len());
    for file in &manifest.files {
        entries.push(validate_entry(storage, snapshot_dir, &manifest, file)?);
    }

    Ok(ValidatedSnapshot { manifest, entries })
}

fn validate_entry(
    storage: &dyn Storage,
    snapshot_dir: &Path,
    manifest: &Manifest,
    file: &FileEntry,
) -> Result<ValidEntry> {
    if file.path.is_empty() {
        return Err(VaultError::SnapshotCorrupt(
            "Invalid manifest entry: empty path.".to_string(),
        ));
    }
    if file.entry_type != "file" {
        return Err(VaultError::SnapshotCorrupt(format!(
            "Invalid manifest entry type '{}' for '{}'.",
            file.entry_type, file.path
        )));
    }

    // Path-traversal defense: checked before any caller writes anything.
    let relative = Path::new(&file.path);
    if relative.is_absolute()
        || relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(VaultError::SnapshotCorrupt(format!(
            "Invalid manifest entry: unsafe path '{}'.",
            file.path
        )));
    }

    let digest_hex = if manifest.is_digest_bearing() {
        match &file.digest_hex {
            Some(d) if d.len() == 64 && d.chars().all(|c| c.is_ascii_hexdigit()) => Some(d.clone()),
            _ => {
                return Err(VaultError::SnapshotCorrupt(format!(
                    "Invalid manifest entry: missing or malformed digest for '{}'.",
                    file.path
                )))
            }
        }
    } else {
        None
    };

    let stored_path = snapshot_dir.join(relative);
    if !storage.is_file(&stored_path) {
        return Err(VaultError::SnapshotCorrupt(format!(
            "Snapshot is missing file '{}'.",
            file.path
        )));
    }
    let actual_size = storage.file_size(&stored_path)?;
    if actual_size != file.size {
        return Err(VaultError::SnapshotCorrupt(format!(
            "Size mismatch for '{}': manifest says {} bytes, stored file has {}.",
            file.path, file.size, actual_size
        )));
    }

    Ok(ValidEntry {
        relative_path: relative.to_path_buf(),
        stored_path,
        size: file.size,
        digest_hex,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::hash_bytes;
    use crate::manifest::test_support::{write_signed, write_signed_manifest};
    use crate::storage::MemStorage;

    // Build a valid digest-bearing snapshot at /vault/snap.
    fn seed_snapshot(storage: &MemStorage) -> PathBuf {
        let snap = PathBuf::from("/vault/snap");
        storage.put_file(&snap.join("a.txt"), b"hello");
        storage.put_file(&snap.join("dir/b.bin"), b"\x01\x02\x03\x04");
        write_signed(
            storage,
            &snap,
            vec![
                entry("a.txt", 5, &hash_bytes(b"hello")),
                entry("dir/b.bin", 4, &hash_bytes(b"\x01\x02\x03\x04")),
            ],
        );
        snap
    }

    fn entry(path: &str, size: u64, digest: &str) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            size,
            entry_type: "file".to_string(),
            digest_hex: Some(digest.to_string()),
        }
    }

    #[test]
    fn valid_snapshot_passes_with_all_entries() {
        let storage = MemStorage::new();
        let snap = seed_snapshot(&storage);

        let validated = validate_snapshot(&storage, &snap, &KeyConfig::default()).unwrap();
        assert_eq!(validated.entries.len(), 2);
        assert_eq!(validated.entries[0].relative_path, Path::new("a.txt"));
        assert!(validated.entries[1].digest_hex.is_some());
    }

    #[test]
    fn missing_manifest_refuses() {
        let storage = MemStorage::new();
        storage.put_file(Path::new("/vault/snap/a.txt"), b"x");

        let err =
            validate_snapshot(&storage, Path::new("/vault/snap"), &KeyConfig::default())
                .unwrap_err();
        assert!(matches!(err, VaultError::SnapshotCorrupt(_)));
    }

    #[test]
    fn traversal_path_refuses_before_any_action() {
        let storage = MemStorage::new();
        let snap = PathBuf::from("/vault/snap");
        storage.put_file(&snap.join("a.txt"), b"hello");
        write_signed(
            &storage,
            &snap,
            vec![entry("../escape.txt", 5, &hash_bytes(b"hello"))],
        );

        let err = validate_snapshot(&storage, &snap, &KeyConfig::default()).unwrap_err();
        assert!(err.to_string().contains("unsafe path"));
    }

    #[test]
    fn absolute_path_refuses() {
        let storage = MemStorage::new();
        let snap = PathBuf::from("/vault/snap");
        storage.put_file(&snap.join("a.txt"), b"hello");
        write_signed(
            &storage,
            &snap,
            vec![entry("/etc/passwd", 5, &hash_bytes(b"hello"))],
        );

        assert!(validate_snapshot(&storage, &snap, &KeyConfig::default()).is_err());
    }

    #[test]
    fn missing_stored_file_refuses() {
        let storage = MemStorage::new();
        let snap = PathBuf::from("/vault/snap");
        storage.create_dir_all(&snap).unwrap();
        write_signed(
            &storage,
            &snap,
            vec![entry("ghost.txt", 5, &hash_bytes(b"hello"))],
        );

        let err = validate_snapshot(&storage, &snap, &KeyConfig::default()).unwrap_err();
        assert!(err.to_string().contains("missing file"));
    }

    #[test]
    fn size_mismatch_refuses() {
        let storage = MemStorage::new();
        let snap = PathBuf::from("/vault/snap");
        storage.put_file(&snap.join("a.txt"), b"hell");
        write_signed(
            &storage,
            &snap,
            vec![entry("a.txt", 5, &hash_bytes(b"hello"))],
        );

        let err = validate_snapshot(&storage, &snap, &KeyConfig::default()).unwrap_err();
        assert!(err.to_string().contains("Size mismatch"));
    }

    #[test]
    fn digest_bearing_manifest_without_digest_refuses() {
        let storage = MemStorage::new();
        let snap = PathBuf::from("/vault/snap");
        storage.put_file(&snap.join("a.txt"), b"hello");
        write_signed(
            &storage,
            &snap,
            vec![FileEntry {
                path: "a.txt".to_string(),
                size: 5,
                entry_type: "file".to_string(),
                digest_hex: None,
            }],
        );

        assert!(validate_snapshot(&storage, &snap, &KeyConfig::default()).is_err());
    }

    #[test]
    fn unsupported_manifest_version_refuses() {
        let storage = MemStorage::new();
        let snap = PathBuf::from("/vault/snap");
        storage.put_file(&snap.join("a.txt"), b"hello");
        let manifest = Manifest {
            manifest_version: 99,
            checksum_algo: Some("sha256".to_string()),
            files: vec![],
            crypto: None,
            manifest_integrity: None,
        };
        write_signed_manifest(&storage, &snap, manifest);

        assert!(validate_snapshot(&storage, &snap, &KeyConfig::default()).is_err());
    }
}
