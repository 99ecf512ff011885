//! Backup engine: preflight, plan, execute.
//!
//! A backup stages a full copy under `.incomplete-<id>`, computes the
//! manifest from the staged bytes, signs it, and promotes the directory with
//! one atomic rename. Nothing under the final id exists until every phase
//! has succeeded, so a crash at any point leaves only an invisible staging
//! directory behind.

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::digest::{hash_path, CHECKSUM_ALGO};
use crate::error::{Result, VaultError};
use crate::keys::{resolve_manifest_key, KeyConfig};
use crate::manifest::{
    integrity::add_integrity_block, write_manifest, FileEntry, Manifest, MANIFEST_FILE_NAME,
    MANIFEST_VERSION_DIGEST,
};
use crate::storage::walk::{walk_tree, NodeKind};
use crate::storage::Storage;

use super::STAGING_PREFIX;

/// Cap on unreadable-path samples carried in a preflight report.
const MAX_UNREADABLE_SAMPLES: usize = 25;

/// What to back up, and where to.
#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub source_root: PathBuf,
    pub backup_root: PathBuf,

    /// Optional operator label, logged but not persisted.
    pub label: Option<String>,

    /// Compute the plan without touching storage.
    pub dry_run: bool,

    /// Name-contains patterns excluded from the walk (subtrees included).
    pub ignore_patterns: Vec<String>,
}

impl BackupRequest {
    pub fn new(source_root: impl Into<PathBuf>, backup_root: impl Into<PathBuf>) -> Self {
        BackupRequest {
            source_root: source_root.into(),
            backup_root: backup_root.into(),
            label: None,
            dry_run: false,
            ignore_patterns: Vec::new(),
        }
    }
}

/// A fresh snapshot id and its two candidate directories.
#[derive(Debug, Clone)]
pub struct BackupPlan {
    pub backup_id: String,
    pub backup_path: PathBuf,
    pub staging_path: PathBuf,
}

/// Read-only safety report for a prospective backup. Never persisted.
#[derive(Debug, Default)]
pub struct PreflightReport {
    pub file_count: usize,
    pub total_bytes: u64,
    pub skipped_symlinks: usize,

    pub unreadable_permission_denied: usize,
    pub unreadable_locked_or_in_use: usize,
    pub unreadable_not_found: usize,
    pub unreadable_other_io: usize,

    /// Bounded sample of unreadable paths, at most [`MAX_UNREADABLE_SAMPLES`].
    pub unreadable_samples: Vec<String>,
}

impl PreflightReport {
    pub fn unreadable_total(&self) -> usize {
        self.unreadable_permission_denied
            + self.unreadable_locked_or_in_use
            + self.unreadable_not_found
            + self.unreadable_other_io
    }

    fn record_failure(&mut self, path: &Path, err: &io::Error) {
        match classify_io_error(err) {
            IoFailure::PermissionDenied => self.unreadable_permission_denied += 1,
            IoFailure::LockedOrInUse => self.unreadable_locked_or_in_use += 1,
            IoFailure::NotFound => self.unreadable_not_found += 1,
            IoFailure::Other => self.unreadable_other_io += 1,
        }
        if self.unreadable_samples.len() < MAX_UNREADABLE_SAMPLES {
            self.unreadable_samples
                .push(path.to_string_lossy().into_owned());
        }
    }
}

enum IoFailure {
    PermissionDenied,
    LockedOrInUse,
    NotFound,
    Other,
}

fn classify_io_error(err: &io::Error) -> IoFailure {
    match err.kind() {
        io::ErrorKind::PermissionDenied => IoFailure::PermissionDenied,
        io::ErrorKind::NotFound => IoFailure::NotFound,
        // Windows sharing violations surface as raw os errors 32 and 33.
        _ => match err.raw_os_error() {
            Some(32) | Some(33) => IoFailure::LockedOrInUse,
            _ => IoFailure::Other,
        },
    }
}

const ENOSPC: i32 = 28;

fn map_copy_error(err: io::Error) -> VaultError {
    if err.raw_os_error() == Some(ENOSPC) {
        return VaultError::CapacityExceeded(
            "Backup destination ran out of space during staging copy.".to_string(),
        );
    }
    if err.kind() == io::ErrorKind::PermissionDenied {
        return VaultError::SourceUnreadable(format!(
            "A source file became unreadable during the staging copy: {err}"
        ));
    }
    VaultError::Io(err)
}

/// Outcome of a completed (or dry-run) backup.
#[derive(Debug)]
pub struct BackupResult {
    pub backup_id: String,
    pub backup_path: PathBuf,
    pub files_copied: usize,
    pub bytes_copied: u64,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct BackupEngine<'a> {
    storage: &'a dyn Storage,
    keys: KeyConfig,
}

impl<'a> BackupEngine<'a> {
    pub fn new(storage: &'a dyn Storage, keys: KeyConfig) -> Self {
        BackupEngine { storage, keys }
    }

    /// Walk the source read-only and report what a backup would touch.
    ///
    /// Each file gets a one-byte read probe so locked or permission-denied
    /// files surface here instead of mid-copy. Probe failures are recorded,
    /// never fatal; enforcement happens in [`BackupEngine::execute`].
    pub fn preflight(&self, request: &BackupRequest) -> Result<PreflightReport> {
        if !self.storage.is_dir(&request.source_root) {
            return Err(VaultError::SourceUnreadable(format!(
                "Source directory does not exist: {}",
                request.source_root.display()
            )));
        }

        let mut report = PreflightReport::default();
        let outcome = walk_tree(self.storage, &request.source_root, &request.ignore_patterns);

        for (path, err) in &outcome.failures {
            report.record_failure(path, err);
        }

        for entry in &outcome.entries {
            match entry.kind {
                NodeKind::Symlink => report.skipped_symlinks += 1,
                NodeKind::Dir => {}
                NodeKind::File => match self.probe_read(&entry.path) {
                    Ok(()) => {
                        report.file_count += 1;
                        report.total_bytes += entry.size;
                    }
                    Err(err) => report.record_failure(&entry.path, &err),
                },
            }
        }

        debug!(
            files = report.file_count,
            bytes = report.total_bytes,
            unreadable = report.unreadable_total(),
            "preflight complete"
        );
        Ok(report)
    }

    /// Derive a fresh snapshot id and its staging/final paths.
    ///
    /// The random suffix keeps same-second backups distinct.
    pub fn plan(&self, request: &BackupRequest) -> BackupPlan {
        let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ");
        let suffix = Uuid::new_v4().simple().to_string();
        let backup_id = format!("{timestamp}-{}", &suffix[..8]);

        let backup_path = request.backup_root.join(&backup_id);
        let staging_path = request
            .backup_root
            .join(format!("{STAGING_PREFIX}{backup_id}"));
        BackupPlan {
            backup_id,
            backup_path,
            staging_path,
        }
    }

    /// Run a full backup: stage, manifest, sign, promote.
    pub fn execute(&self, request: &BackupRequest) -> Result<BackupResult> {
        let started_at = Utc::now();

        self.refuse_self_nesting(request)?;

        let plan = self.plan(request);
        if request.dry_run {
            info!(id = %plan.backup_id, "dry run; no storage touched");
            return Ok(BackupResult {
                backup_id: plan.backup_id,
                backup_path: plan.backup_path,
                files_copied: 0,
                bytes_copied: 0,
                dry_run: true,
                started_at,
                finished_at: Utc::now(),
            });
        }

        if !self.storage.is_dir(&request.source_root) {
            return Err(VaultError::SourceUnreadable(format!(
                "Source directory does not exist: {}",
                request.source_root.display()
            )));
        }

        let source = walk_tree(self.storage, &request.source_root, &request.ignore_patterns);
        if !source.failures.is_empty() {
            let (first_path, first_err) = &source.failures[0];
            return Err(VaultError::SourceUnreadable(format!(
                "Source has {} unreadable entries; first: {} ({}).",
                source.failures.len(),
                first_path.display(),
                first_err
            )));
        }

        self.storage.create_dir_all(&request.backup_root)?;
        // Must not already exist; an id collision here is a hard failure.
        self.storage.create_dir(&plan.staging_path)?;

        info!(
            id = %plan.backup_id,
            source = %request.source_root.display(),
            label = request.label.as_deref().unwrap_or(""),
            "staging backup"
        );

        let mut files_copied = 0usize;
        let mut bytes_copied = 0u64;
        let mut skipped_symlinks = 0usize;
        for entry in &source.entries {
            let staged = plan.staging_path.join(&entry.relative_path);
            match entry.kind {
                NodeKind::Symlink => skipped_symlinks += 1,
                NodeKind::Dir => self.storage.create_dir_all(&staged)?,
                NodeKind::File => {
                    if let Some(parent) = staged.parent() {
                        self.storage.create_dir_all(parent)?;
                    }
                    self.storage
                        .copy_file(&entry.path, &staged)
                        .map_err(map_copy_error)?;
                    files_copied += 1;
                    bytes_copied += entry.size;
                }
            }
        }
        if skipped_symlinks > 0 {
            debug!(count = skipped_symlinks, "skipped symlinks");
        }

        let manifest = self.build_manifest(&plan.staging_path)?;
        let key = resolve_manifest_key(self.storage, &self.keys)?;
        let signed = add_integrity_block(&manifest, key.as_ref())?;
        write_manifest(
            self.storage,
            &plan.staging_path.join(MANIFEST_FILE_NAME),
            &signed,
        )?;

        // The one irreversible transition: staging becomes final atomically.
        self.storage.rename(&plan.staging_path, &plan.backup_path)?;

        info!(
            id = %plan.backup_id,
            files = files_copied,
            bytes = bytes_copied,
            "backup promoted"
        );

        Ok(BackupResult {
            backup_id: plan.backup_id,
            backup_path: plan.backup_path,
            files_copied,
            bytes_copied,
            dry_run: false,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Refuse a backup root that resolves inside the source tree, which
    /// would otherwise copy the vault into itself without bound.
    fn refuse_self_nesting(&self, request: &BackupRequest) -> Result<()> {
        let source = self.storage.canonicalize(&request.source_root)?;
        let backup_root = self.storage.canonicalize(&request.backup_root)?;
        if backup_root.starts_with(&source) {
            return Err(VaultError::VaultUnavailable(format!(
                "Backup directory {} is inside the source tree {}; refusing.",
                request.backup_root.display(),
                request.source_root.display()
            )));
        }
        Ok(())
    }

    fn probe_read(&self, path: &Path) -> io::Result<()> {
        let mut reader = self.storage.open_read(path)?;
        let mut probe = [0u8; 1];
        reader.read(&mut probe)?;
        Ok(())
    }

    /// Walk the staged copy and assemble a digest-bearing manifest, entries
    /// sorted by path.
    fn build_manifest(&self, staging_path: &Path) -> Result<Manifest> {
        let staged = walk_tree(self.storage, staging_path, &[]);
        if let Some((path, err)) = staged.failures.first() {
            return Err(VaultError::InvariantViolation(format!(
                "staged copy became unreadable at {}: {err}",
                path.display()
            )));
        }

        let mut files = Vec::new();
        for entry in &staged.entries {
            if entry.kind != NodeKind::File {
                continue;
            }
            let digest = hash_path(self.storage, &entry.path)?;
            files.push(FileEntry {
                path: to_posix_string(&entry.relative_path),
                size: entry.size,
                entry_type: "file".to_string(),
                digest_hex: Some(digest.hex),
            });
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(Manifest {
            manifest_version: MANIFEST_VERSION_DIGEST,
            checksum_algo: Some(CHECKSUM_ALGO.to_string()),
            files,
            crypto: None,
            manifest_integrity: None,
        })
    }
}

/// Render a relative path with forward slashes regardless of platform.
fn to_posix_string(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
