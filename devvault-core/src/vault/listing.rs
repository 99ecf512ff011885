//! Snapshot discovery.

use std::path::{Path, PathBuf};

use crate::engine::is_staging_path;
use crate::manifest::MANIFEST_FILE_NAME;
use crate::storage::Storage;

/// A discoverable (final) snapshot under a vault root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRef {
    pub snapshot_id: String,
    pub path: PathBuf,
}

/// Enumerate final snapshots, newest id first.
///
/// Only immediate children count, and only directories that are not staging
/// and contain a manifest. Everything else (staging directories, the
/// housekeeping directory, stray files) is invisible. An unlistable root
/// yields an empty list.
pub fn list_snapshots(storage: &dyn Storage, backup_root: &Path) -> Vec<SnapshotRef> {
    let children = match storage.list_dir(backup_root) {
        Ok(children) => children,
        Err(_) => return Vec::new(),
    };

    let mut snapshots: Vec<SnapshotRef> = children
        .into_iter()
        .filter(|child| storage.is_dir(child))
        .filter(|child| !is_staging_path(child))
        .filter(|child| storage.is_file(&child.join(MANIFEST_FILE_NAME)))
        .filter_map(|child| {
            let snapshot_id = child.file_name()?.to_string_lossy().into_owned();
            Some(SnapshotRef {
                snapshot_id,
                path: child,
            })
        })
        .collect();

    // Ids start with a compact UTC timestamp, so reverse-lexicographic is
    // newest first.
    snapshots.sort_by(|a, b| b.snapshot_id.cmp(&a.snapshot_id));
    snapshots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;

    fn seed_snapshot(storage: &MemStorage, id: &str) {
        storage.put_file(
            &PathBuf::from("/vault").join(id).join(MANIFEST_FILE_NAME),
            b"{}",
        );
    }

    #[test]
    fn lists_final_snapshots_newest_first() {
        let storage = MemStorage::new();
        seed_snapshot(&storage, "20250101T000000Z-aaaaaaaa");
        seed_snapshot(&storage, "20250301T000000Z-cccccccc");
        seed_snapshot(&storage, "20250201T000000Z-bbbbbbbb");

        let ids: Vec<String> = list_snapshots(&storage, Path::new("/vault"))
            .into_iter()
            .map(|s| s.snapshot_id)
            .collect();
        assert_eq!(
            ids,
            vec![
                "20250301T000000Z-cccccccc",
                "20250201T000000Z-bbbbbbbb",
                "20250101T000000Z-aaaaaaaa"
            ]
        );
    }

    #[test]
    fn staging_and_manifestless_directories_are_invisible() {
        let storage = MemStorage::new();
        seed_snapshot(&storage, "20250101T000000Z-aaaaaaaa");
        storage
            .create_dir_all(Path::new("/vault/.incomplete-20250102T000000Z-bbbbbbbb"))
            .unwrap();
        storage
            .create_dir_all(Path::new("/vault/no-manifest-here"))
            .unwrap();
        storage.put_file(Path::new("/vault/stray.txt"), b"x");

        let listed = list_snapshots(&storage, Path::new("/vault"));
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].snapshot_id, "20250101T000000Z-aaaaaaaa");
    }

    #[test]
    fn missing_root_lists_nothing() {
        let storage = MemStorage::new();
        assert!(list_snapshots(&storage, Path::new("/nowhere")).is_empty());
    }
}
