//! OS-backed storage implementation over `std::fs`.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use super::{normalize_lexically, Storage};

/// Real-filesystem storage. Stateless; cheap to construct per call site.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsStorage;

impl OsStorage {
    pub fn new() -> Self {
        OsStorage
    }
}

impl Storage for OsStorage {
    fn exists(&self, path: &Path) -> bool {
        // symlink_metadata so dangling links still count as present
        path.exists() || fs::symlink_metadata(path).is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_symlink(&self, path: &Path) -> bool {
        fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(path)? {
            out.push(entry?.path());
        }
        Ok(out)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read>> {
        Ok(Box::new(fs::File::open(path)?))
    }

    fn copy_file(&self, src: &Path, dst: &Path) -> io::Result<()> {
        fs::copy(src, dst)?;
        Ok(())
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write_string(&self, path: &Path, contents: &str) -> io::Result<()> {
        fs::write(path, contents)
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        if let Ok(resolved) = fs::canonicalize(path) {
            return Ok(resolved);
        }

        // Path does not exist yet: resolve the deepest existing ancestor and
        // re-append the remaining lexically-normalized components.
        let mut existing = path.to_path_buf();
        let mut tail: Vec<std::ffi::OsString> = Vec::new();
        loop {
            match fs::canonicalize(&existing) {
                Ok(base) => {
                    let mut resolved = base;
                    for part in tail.iter().rev() {
                        resolved.push(part);
                    }
                    return Ok(normalize_lexically(&resolved));
                }
                Err(_) => match (existing.parent(), existing.file_name()) {
                    (Some(parent), Some(name)) => {
                        tail.push(name.to_os_string());
                        existing = parent.to_path_buf();
                    }
                    _ => return Ok(normalize_lexically(path)),
                },
            }
        }
    }
}
