//! The cached snapshot index.
//!
//! A derived cache at `<vault>/.devvault/snapshot_index.json`. Loading is
//! strict (version tag must match, shape must parse); rebuilding is lenient
//! (an individually corrupt manifest is skipped, not fatal); writing is
//! atomic so readers never observe a partial index.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::keys::vault_key::VAULT_META_DIR;
use crate::manifest::canonical_json;
use crate::storage::Storage;

use super::listing::list_snapshots;
use super::metadata::read_snapshot_metadata;

pub const INDEX_VERSION: u32 = 1;

const INDEX_FILE_NAME: &str = "snapshot_index.json";

/// One row of the cached index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotRow {
    pub snapshot_id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub manifest_version: u32,
    pub checksum_algo: Option<String>,
    pub file_count: usize,
    pub total_bytes: u64,
}

/// The cache file as a whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotIndex {
    pub index_version: u32,
    pub generated_at: DateTime<Utc>,
    pub rows: Vec<SnapshotRow>,
}

/// Location of the index cache for a vault.
pub fn index_path(backup_root: &Path) -> PathBuf {
    backup_root.join(VAULT_META_DIR).join(INDEX_FILE_NAME)
}

/// Load the cached index, or `None` on any malformation.
///
/// Missing file, unparsable JSON, unknown fields, and a wrong version tag
/// all mean "rebuild me"; none of them are errors.
pub fn load_index(storage: &dyn Storage, backup_root: &Path) -> Option<SnapshotIndex> {
    let raw = storage.read_to_string(&index_path(backup_root)).ok()?;
    let index: SnapshotIndex = serde_json::from_str(&raw).ok()?;
    if index.index_version != INDEX_VERSION {
        return None;
    }
    Some(index)
}

/// Rebuild the index from every current final snapshot's manifest.
///
/// A snapshot whose manifest will not summarize is skipped with a warning;
/// the rest of the rebuild proceeds.
pub fn rebuild_index(storage: &dyn Storage, backup_root: &Path) -> SnapshotIndex {
    let mut rows = Vec::new();
    for snapshot in list_snapshots(storage, backup_root) {
        match read_snapshot_metadata(storage, &snapshot) {
            Ok(metadata) => rows.push(SnapshotRow {
                snapshot_id: metadata.snapshot_id,
                created_at: metadata.created_at,
                manifest_version: metadata.manifest_version,
                checksum_algo: metadata.checksum_algo,
                file_count: metadata.file_count,
                total_bytes: metadata.total_bytes,
            }),
            Err(err) => {
                warn!(
                    snapshot = %snapshot.snapshot_id,
                    error = %err,
                    "skipping snapshot during index rebuild"
                );
            }
        }
    }

    SnapshotIndex {
        index_version: INDEX_VERSION,
        generated_at: Utc::now(),
        rows,
    }
}

/// Persist the index atomically (temp file, then rename).
pub fn write_index(
    storage: &dyn Storage,
    backup_root: &Path,
    index: &SnapshotIndex,
) -> Result<()> {
    let path = index_path(backup_root);
    storage.create_dir_all(&backup_root.join(VAULT_META_DIR))?;

    let value = serde_json::to_value(index)?;
    let tmp = path.with_extension("json.tmp");
    storage.write_string(&tmp, &canonical_json(&value))?;
    storage.rename(&tmp, &path)?;
    Ok(())
}
