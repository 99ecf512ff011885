//! Cheap vault health probe. Never hashes content.

use std::path::Path;

use crate::storage::Storage;

use super::index::{load_index, rebuild_index};

/// Result of a health probe against a vault root.
#[derive(Debug, Clone)]
pub struct VaultHealth {
    pub root_exists: bool,
    pub is_directory: bool,
    pub listable: bool,

    /// Final snapshots the index knows about (0 when unhealthy).
    pub snapshot_count: usize,

    /// Cache was loadable, or a rebuild produced a usable index.
    pub index_ok: bool,
}

impl VaultHealth {
    pub fn is_healthy(&self) -> bool {
        self.root_exists && self.is_directory && self.listable && self.index_ok
    }
}

/// Probe a vault root: existence, shape, listability, index viability.
pub fn check_vault_health(storage: &dyn Storage, backup_root: &Path) -> VaultHealth {
    let root_exists = storage.exists(backup_root);
    let is_directory = root_exists && storage.is_dir(backup_root);
    let listable = is_directory && storage.list_dir(backup_root).is_ok();

    if !listable {
        return VaultHealth {
            root_exists,
            is_directory,
            listable,
            snapshot_count: 0,
            index_ok: false,
        };
    }

    // Loadable cache, else a fresh in-memory rebuild. Nothing is written
    // during a health probe.
    let index = load_index(storage, backup_root)
        .unwrap_or_else(|| rebuild_index(storage, backup_root));

    VaultHealth {
        root_exists,
        is_directory,
        listable,
        snapshot_count: index.rows.len(),
        index_ok: true,
    }
}
