//! Storage capability — the filesystem boundary for every engine.
//!
//! All vault operations go through [`Storage`] instead of touching `std::fs`
//! directly, so the engines stay unit-testable against the in-memory double
//! and the integrity guarantees do not depend on ambient process state.

pub mod memory;
pub mod os;
pub mod walk;

pub use memory::MemStorage;
pub use os::OsStorage;

use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Filesystem primitives the engines are allowed to use.
///
/// `rename` must be atomic on the same filesystem; the backup promotion and
/// every cache/temp-file write depend on it.
pub trait Storage {
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn is_symlink(&self, path: &Path) -> bool;

    /// Size in bytes of a regular file.
    fn file_size(&self, path: &Path) -> io::Result<u64>;

    /// Immediate children of a directory (no recursion, no ordering promise).
    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Create a directory; fails if it already exists.
    fn create_dir(&self, path: &Path) -> io::Result<()>;

    /// Create a directory and any missing parents; ok if already present.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Atomic rename (same filesystem).
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Streamed read of a file's bytes.
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read>>;

    /// Copy file contents; the destination parent must already exist.
    fn copy_file(&self, src: &Path, dst: &Path) -> io::Result<()>;

    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    fn write_string(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Resolve a path to its canonical form. For paths that do not exist
    /// yet, implementations resolve the deepest existing ancestor and append
    /// the remainder, so self-nesting checks work before anything is created.
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;
}

/// Remove `.` components and collapse `..` against preceding names.
pub(crate) fn normalize_lexically(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
