//! In-memory storage double for unit tests.
//!
//! Mirrors the observable semantics of [`OsStorage`] closely enough for the
//! engines: exclusive `create_dir`, parent-must-exist writes, subtree
//! renames, and symlink nodes that are present but never followed.

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{normalize_lexically, Storage};

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
    Symlink(PathBuf),
}

/// Shared-nothing fake filesystem keyed by normalized absolute paths.
#[derive(Debug, Default)]
pub struct MemStorage {
    nodes: Mutex<BTreeMap<PathBuf, Node>>,
}

impl MemStorage {
    pub fn new() -> Self {
        let storage = MemStorage {
            nodes: Mutex::new(BTreeMap::new()),
        };
        storage
            .nodes
            .lock()
            .unwrap()
            .insert(PathBuf::from("/"), Node::Dir);
        storage
    }

    fn norm(path: &Path) -> PathBuf {
        normalize_lexically(path)
    }

    /// Test helper: create a file, making parent directories on the way.
    pub fn put_file(&self, path: &Path, contents: &[u8]) {
        let path = Self::norm(path);
        let mut nodes = self.nodes.lock().unwrap();
        let mut parent = path.parent().map(Path::to_path_buf);
        while let Some(p) = parent {
            nodes.entry(p.clone()).or_insert(Node::Dir);
            parent = p.parent().map(Path::to_path_buf);
        }
        nodes.insert(path, Node::File(contents.to_vec()));
    }

    /// Test helper: place a symlink node (never followed by any operation).
    pub fn put_symlink(&self, path: &Path, target: &Path) {
        let path = Self::norm(path);
        self.nodes
            .lock()
            .unwrap()
            .insert(path, Node::Symlink(target.to_path_buf()));
    }

    /// Test helper: read a file's bytes back out.
    pub fn file_contents(&self, path: &Path) -> Option<Vec<u8>> {
        match self.nodes.lock().unwrap().get(&Self::norm(path)) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{}", path.display()))
}

impl Storage for MemStorage {
    fn exists(&self, path: &Path) -> bool {
        self.nodes.lock().unwrap().contains_key(&Self::norm(path))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(
            self.nodes.lock().unwrap().get(&Self::norm(path)),
            Some(Node::Dir)
        )
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(
            self.nodes.lock().unwrap().get(&Self::norm(path)),
            Some(Node::File(_))
        )
    }

    fn is_symlink(&self, path: &Path) -> bool {
        matches!(
            self.nodes.lock().unwrap().get(&Self::norm(path)),
            Some(Node::Symlink(_))
        )
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        match self.nodes.lock().unwrap().get(&Self::norm(path)) {
            Some(Node::File(data)) => Ok(data.len() as u64),
            _ => Err(not_found(path)),
        }
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let path = Self::norm(path);
        let nodes = self.nodes.lock().unwrap();
        if !matches!(nodes.get(&path), Some(Node::Dir)) {
            return Err(not_found(&path));
        }
        Ok(nodes
            .keys()
            .filter(|p| p.parent() == Some(path.as_path()))
            .cloned()
            .collect())
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        let path = Self::norm(path);
        let mut nodes = self.nodes.lock().unwrap();
        if nodes.contains_key(&path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{}", path.display()),
            ));
        }
        match path.parent() {
            Some(parent) if matches!(nodes.get(parent), Some(Node::Dir)) => {
                nodes.insert(path, Node::Dir);
                Ok(())
            }
            _ => Err(not_found(&path)),
        }
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let path = Self::norm(path);
        let mut nodes = self.nodes.lock().unwrap();
        let mut chain = vec![path.clone()];
        let mut cursor = path;
        while let Some(parent) = cursor.parent() {
            chain.push(parent.to_path_buf());
            cursor = parent.to_path_buf();
        }
        for p in chain.into_iter().rev() {
            match nodes.get(&p) {
                Some(Node::Dir) => {}
                Some(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{}", p.display()),
                    ))
                }
                None => {
                    nodes.insert(p, Node::Dir);
                }
            }
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let from = Self::norm(from);
        let to = Self::norm(to);
        let mut nodes = self.nodes.lock().unwrap();
        if !nodes.contains_key(&from) {
            return Err(not_found(&from));
        }

        // Move the node and, for directories, its whole subtree.
        let moved: Vec<(PathBuf, Node)> = nodes
            .iter()
            .filter(|(p, _)| p.as_path() == from || p.starts_with(&from))
            .map(|(p, n)| (p.clone(), n.clone()))
            .collect();
        for (p, _) in &moved {
            nodes.remove(p);
        }
        for (p, n) in moved {
            let rel = p.strip_prefix(&from).expect("prefix checked above");
            let dest = if rel.as_os_str().is_empty() {
                to.clone()
            } else {
                to.join(rel)
            };
            nodes.insert(dest, n);
        }
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let path = Self::norm(path);
        let mut nodes = self.nodes.lock().unwrap();
        match nodes.get(&path) {
            Some(Node::File(_)) | Some(Node::Symlink(_)) => {
                nodes.remove(&path);
                Ok(())
            }
            _ => Err(not_found(&path)),
        }
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read>> {
        match self.nodes.lock().unwrap().get(&Self::norm(path)) {
            Some(Node::File(data)) => Ok(Box::new(Cursor::new(data.clone()))),
            _ => Err(not_found(path)),
        }
    }

    fn copy_file(&self, src: &Path, dst: &Path) -> io::Result<()> {
        let src = Self::norm(src);
        let dst = Self::norm(dst);
        let mut nodes = self.nodes.lock().unwrap();
        let data = match nodes.get(&src) {
            Some(Node::File(data)) => data.clone(),
            _ => return Err(not_found(&src)),
        };
        match dst.parent() {
            Some(parent) if matches!(nodes.get(parent), Some(Node::Dir)) => {
                nodes.insert(dst, Node::File(data));
                Ok(())
            }
            _ => Err(not_found(&dst)),
        }
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        match self.nodes.lock().unwrap().get(&Self::norm(path)) {
            Some(Node::File(data)) => String::from_utf8(data.clone())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            _ => Err(not_found(path)),
        }
    }

    fn write_string(&self, path: &Path, contents: &str) -> io::Result<()> {
        let path = Self::norm(path);
        let mut nodes = self.nodes.lock().unwrap();
        match path.parent() {
            Some(parent) if matches!(nodes.get(parent), Some(Node::Dir)) => {
                nodes.insert(path, Node::File(contents.as_bytes().to_vec()));
                Ok(())
            }
            _ => Err(not_found(&path)),
        }
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        Ok(Self::norm(path))
    }
}
