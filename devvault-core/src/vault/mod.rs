//! Vault introspection: listing, metadata, the cached index, and health.
//!
//! Everything here is derived from manifests and re-derivable at any time;
//! the index is a disposable cache, never a source of truth. Nothing in this
//! module hashes file content.

pub mod health;
pub mod index;
pub mod listing;
pub mod metadata;
pub mod rows;

pub use health::{check_vault_health, VaultHealth};
pub use index::{SnapshotIndex, SnapshotRow};
pub use listing::{list_snapshots, SnapshotRef};
pub use metadata::{read_snapshot_metadata, SnapshotMetadata};
pub use rows::get_snapshot_rows;
