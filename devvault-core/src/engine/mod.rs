//! Backup, restore, and verify engines.
//!
//! The engines share one rule: every filesystem mutation is guarded by the
//! fail-closed validation in [`pipeline`], and every snapshot transitions
//! from staging to final exactly once, via atomic rename.

pub mod backup;
pub mod pipeline;
pub mod restore;
pub mod verify;

pub use backup::{BackupEngine, BackupPlan, BackupRequest, BackupResult, PreflightReport};
pub use pipeline::{ValidEntry, ValidatedSnapshot};
pub use restore::{RestoreEngine, RestoreRequest};
pub use verify::{VerifyEngine, VerifyRequest, VerifyResult};

use std::path::Path;

/// Directory-name prefix marking an in-progress (never discoverable) snapshot.
pub const STAGING_PREFIX: &str = ".incomplete-";

/// True when the path names a staging directory.
pub fn is_staging_path(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with(STAGING_PREFIX))
        .unwrap_or(false)
}
