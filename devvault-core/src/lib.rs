//! Content-verified snapshot backup engine.
//!
//! Captures a directory tree into an immutable, integrity-checked snapshot
//! and later restores or verifies it with cryptographic assurance that the
//! stored bytes match what was captured. Snapshots become final through one
//! atomic rename, manifests carry a digest or keyed MAC over a canonical
//! payload, and every filesystem mutation is guarded by a fail-closed
//! validation pipeline.

pub mod digest;
pub mod engine;
pub mod error;
pub mod keys;
pub mod logging;
pub mod manifest;
pub mod storage;
pub mod vault;

// Re-export the operation boundary
pub use engine::{
    BackupEngine, BackupPlan, BackupRequest, BackupResult, PreflightReport, RestoreEngine,
    RestoreRequest, VerifyEngine, VerifyRequest, VerifyResult,
};
pub use error::{Result, VaultError};
pub use keys::KeyConfig;
pub use storage::{MemStorage, OsStorage, Storage};
pub use vault::{
    check_vault_health, get_snapshot_rows, list_snapshots, SnapshotRef, SnapshotRow, VaultHealth,
};
