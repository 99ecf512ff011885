//! Streaming content hashing.
//!
//! Produces algorithm-tagged hex digests; everything content-addressed in
//! the vault (file entries, manifest integrity) goes through here.

use std::io::Read;
use std::path::Path;

use sha2::{Digest as _, Sha256};

use crate::error::Result;
use crate::storage::Storage;

/// Chunk size for streaming reads. 1 MiB balances syscalls vs memory.
const CHUNK_SIZE: usize = 1024 * 1024;

/// Algorithm tag used for content digests throughout the vault.
pub const CHECKSUM_ALGO: &str = "sha256";

/// An algorithm-tagged hex digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigest {
    pub algo: String,
    pub hex: String,
}

/// Hash a stream to completion without buffering it whole.
pub fn hash_reader(reader: &mut dyn Read) -> std::io::Result<ContentDigest> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(ContentDigest {
        algo: CHECKSUM_ALGO.to_string(),
        hex: hex::encode(hasher.finalize()),
    })
}

/// Hash a file through the storage capability.
pub fn hash_path(storage: &dyn Storage, path: &Path) -> Result<ContentDigest> {
    let mut reader = storage.open_read(path)?;
    Ok(hash_reader(&mut reader)?)
}

/// Hash an in-memory byte slice (manifest canonical payloads).
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
