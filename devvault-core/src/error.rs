//! Error types for the vault core.
//!
//! Two families: *refusals* are expected, operator-correctable unsafe
//! conditions (the engines fail closed and explain why); everything else is
//! an unexpected internal fault. Callers can branch on
//! [`VaultError::is_refusal`] without broad catch-alls.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    /// Vault path exists but is not safe or usable (not a directory,
    /// unwritable, would nest inside the source, ...).
    #[error("{0}")]
    VaultUnavailable(String),

    /// Source contains unreadable or locked files; backup must refuse.
    #[error("{0}")]
    SourceUnreadable(String),

    /// Snapshot manifest or contents are invalid; verify/restore must refuse.
    #[error("{0}")]
    SnapshotCorrupt(String),

    /// Restore preflight failed (destination not empty, traversal risk, ...).
    #[error("{0}")]
    RestoreRefused(String),

    /// Vault lacks sufficient free space to complete safely.
    #[error("{0}")]
    CapacityExceeded(String),

    /// Unexpected internal fault indicating a bug or a broken invariant.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VaultError {
    /// True for expected, operator-correctable refusals.
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            VaultError::VaultUnavailable(_)
                | VaultError::SourceUnreadable(_)
                | VaultError::SnapshotCorrupt(_)
                | VaultError::RestoreRefused(_)
                | VaultError::CapacityExceeded(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
