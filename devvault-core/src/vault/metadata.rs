//! Per-snapshot summary derived from its manifest. No content hashing.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::Result;
use crate::manifest::{load_manifest, MANIFEST_FILE_NAME};
use crate::storage::Storage;

use super::listing::SnapshotRef;

/// Lightweight, hash-free view of one snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotMetadata {
    pub snapshot_id: String,

    /// Parsed from the id's timestamp prefix; `None` if unparsable.
    pub created_at: Option<DateTime<Utc>>,

    pub manifest_version: u32,
    pub checksum_algo: Option<String>,
    pub file_count: usize,
    pub total_bytes: u64,
}

/// Summarize a snapshot from its manifest alone.
pub fn read_snapshot_metadata(
    storage: &dyn Storage,
    snapshot: &SnapshotRef,
) -> Result<SnapshotMetadata> {
    let manifest = load_manifest(storage, &snapshot.path.join(MANIFEST_FILE_NAME))?;

    Ok(SnapshotMetadata {
        snapshot_id: snapshot.snapshot_id.clone(),
        created_at: parse_created_at(&snapshot.snapshot_id),
        manifest_version: manifest.manifest_version,
        checksum_algo: manifest.checksum_algo.clone(),
        file_count: manifest.files.len(),
        total_bytes: manifest.files.iter().map(|f| f.size).sum(),
    })
}

/// Parse the creation time out of a snapshot id's timestamp prefix.
pub(crate) fn parse_created_at(snapshot_id: &str) -> Option<DateTime<Utc>> {
    let (timestamp, _) = snapshot_id.split_once('-')?;
    NaiveDateTime::parse_from_str(timestamp, "%Y%m%dT%H%M%SZ")
        .ok()
        .map(|naive| naive.and_utc())
}
