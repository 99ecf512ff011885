//! Load-else-rebuild access to the snapshot index.

use std::path::Path;

use tracing::{debug, warn};

use crate::storage::Storage;

use super::index::{load_index, rebuild_index, write_index, SnapshotRow};

/// Current index rows, newest snapshot first.
///
/// Serves the cache when it is well-formed; otherwise rebuilds from the
/// manifests and writes the fresh cache back. A failed cache write is
/// logged, not fatal; the freshly rebuilt rows are still returned. With no
/// listable vault this is an empty list, never an error.
pub fn get_snapshot_rows(storage: &dyn Storage, backup_root: &Path) -> Vec<SnapshotRow> {
    if let Some(index) = load_index(storage, backup_root) {
        debug!(rows = index.rows.len(), "serving cached snapshot index");
        return index.rows;
    }

    let rebuilt = rebuild_index(storage, backup_root);
    if let Err(err) = write_index(storage, backup_root, &rebuilt) {
        warn!(error = %err, "could not persist rebuilt snapshot index");
    }
    rebuilt.rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::hash_bytes;
    use crate::manifest::test_support::write_signed;
    use crate::manifest::FileEntry;
    use crate::storage::MemStorage;
    use crate::vault::index::index_path;
    use std::path::PathBuf;

    fn seed_snapshot(storage: &MemStorage, id: &str) {
        let snap = PathBuf::from("/vault").join(id);
        storage.put_file(&snap.join("f.txt"), b"hello");
        write_signed(
            storage,
            &snap,
            vec![FileEntry {
                path: "f.txt".to_string(),
                size: 5,
                entry_type: "file".to_string(),
                digest_hex: Some(hash_bytes(b"hello")),
            }],
        );
    }

    #[test]
    fn missing_cache_rebuilds_and_persists() {
        let storage = MemStorage::new();
        seed_snapshot(&storage, "20250101T000000Z-aaaaaaaa");

        let rows = get_snapshot_rows(&storage, Path::new("/vault"));
        assert_eq!(rows.len(), 1);
        assert!(storage.exists(&index_path(Path::new("/vault"))));
    }

    #[test]
    fn corrupt_cache_is_silently_replaced() {
        let storage = MemStorage::new();
        seed_snapshot(&storage, "20250101T000000Z-aaaaaaaa");
        storage.put_file(&index_path(Path::new("/vault")), b"not json");

        let rows = get_snapshot_rows(&storage, Path::new("/vault"));
        assert_eq!(rows.len(), 1);

        let raw = storage
            .read_to_string(&index_path(Path::new("/vault")))
            .unwrap();
        assert!(raw.contains("20250101T000000Z-aaaaaaaa"));
    }

    #[test]
    fn empty_vault_yields_empty_rows() {
        let storage = MemStorage::new();
        assert!(get_snapshot_rows(&storage, Path::new("/nowhere")).is_empty());
    }
}
