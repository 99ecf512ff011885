//! Directory traversal over the storage capability.
//!
//! Uses an explicit work stack instead of recursion so deep or adversarial
//! trees cannot exhaust the call stack, and runs entirely through
//! [`Storage`] so the in-memory double is walkable too.

use std::io;
use std::path::{Path, PathBuf};

use super::Storage;

/// Classification of a discovered node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Dir,
    Symlink,
}

/// One node discovered during walking.
#[derive(Debug, Clone)]
pub struct WalkEntry {
    /// Full path to the node.
    pub path: PathBuf,

    /// Path relative to the walk root.
    pub relative_path: PathBuf,

    /// File size in bytes (0 for directories and symlinks).
    pub size: u64,

    pub kind: NodeKind,
}

/// Everything a tolerant walk produced: the entries it could see and the
/// paths it could not.
#[derive(Debug, Default)]
pub struct WalkOutcome {
    pub entries: Vec<WalkEntry>,
    pub failures: Vec<(PathBuf, io::Error)>,
}

/// Walk a tree breadth-unbounded, depth-first, collecting every node.
///
/// Symlinks are reported as [`NodeKind::Symlink`] and never followed.
/// Children are visited in sorted order so output is deterministic.
/// `exclude_patterns` drop any node whose file name contains a pattern
/// (and, for directories, its whole subtree).
///
/// Listing or stat failures land in [`WalkOutcome::failures`] instead of
/// aborting; callers decide whether those are fatal.
pub fn walk_tree(storage: &dyn Storage, root: &Path, exclude_patterns: &[String]) -> WalkOutcome {
    let mut outcome = WalkOutcome::default();
    let mut stack: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut children = match storage.list_dir(&dir) {
            Ok(children) => children,
            Err(e) => {
                outcome.failures.push((dir, e));
                continue;
            }
        };
        children.sort();

        for child in children {
            if should_exclude(&child, exclude_patterns) {
                continue;
            }

            let relative_path = child
                .strip_prefix(root)
                .unwrap_or(child.as_path())
                .to_path_buf();

            if storage.is_symlink(&child) {
                outcome.entries.push(WalkEntry {
                    path: child,
                    relative_path,
                    size: 0,
                    kind: NodeKind::Symlink,
                });
            } else if storage.is_dir(&child) {
                outcome.entries.push(WalkEntry {
                    path: child.clone(),
                    relative_path,
                    size: 0,
                    kind: NodeKind::Dir,
                });
                stack.push(child);
            } else {
                match storage.file_size(&child) {
                    Ok(size) => outcome.entries.push(WalkEntry {
                        path: child,
                        relative_path,
                        size,
                        kind: NodeKind::File,
                    }),
                    Err(e) => outcome.failures.push((child, e)),
                }
            }
        }
    }

    outcome
}

/// Check if a path should be excluded based on name-contains patterns.
fn should_exclude(path: &Path, patterns: &[String]) -> bool {
    let file_name = match path.file_name() {
        Some(name) => name.to_string_lossy(),
        None => return false,
    };
    patterns.iter().any(|p| file_name.contains(p.as_str()))
}
