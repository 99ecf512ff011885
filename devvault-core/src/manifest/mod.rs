//! Snapshot manifest: typed schema, one-pass parsing, canonical form.
//!
//! A manifest is parsed into a fully validated typed value or rejected in
//! one pass; partially validated manifest data never flows into the engines.
//! The canonical serialization (recursively sorted keys, fixed 2-space
//! indentation) is what integrity digests are computed over, so it must stay
//! stable across versions.

pub mod integrity;
pub mod schema;

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, VaultError};
use crate::storage::Storage;

/// Manifest file name inside every snapshot directory.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Legacy manifests: no per-file digests.
pub const MANIFEST_VERSION_LEGACY: u32 = 1;

/// Digest-bearing manifests.
pub const MANIFEST_VERSION_DIGEST: u32 = 2;

/// Per-snapshot manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub manifest_version: u32,

    /// Present when the version carries digests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_algo: Option<String>,

    pub files: Vec<FileEntry>,

    /// Declared-but-possibly-inert encryption scheme. Validated, never acted on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crypto: Option<CryptoStanza>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_integrity: Option<IntegrityBlock>,
}

/// One file captured in the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    /// POSIX-style path relative to the snapshot root.
    pub path: String,

    pub size: u64,

    #[serde(rename = "type")]
    pub entry_type: String,

    /// 64-hex-character content digest (v2 manifests).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest_hex: Option<String>,
}

/// Forward-compatible encryption declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CryptoStanza {
    pub version: u32,
    pub content: CryptoContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CryptoContent {
    pub scheme: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aad: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce_policy: Option<String>,
}

/// Digest or keyed MAC over the canonical manifest payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityBlock {
    pub algo: String,
    pub digest_hex: String,
}

impl Manifest {
    pub fn is_digest_bearing(&self) -> bool {
        self.manifest_version == MANIFEST_VERSION_DIGEST
    }
}

/// Load and parse a snapshot manifest. Malformed serialization is rejected
/// immediately as a corrupt-snapshot refusal.
pub fn load_manifest(storage: &dyn Storage, manifest_path: &Path) -> Result<Manifest> {
    let raw = storage.read_to_string(manifest_path)?;
    serde_json::from_str(&raw).map_err(|_| {
        VaultError::SnapshotCorrupt(format!(
            "Snapshot manifest is invalid; refusing. Path: {}",
            manifest_path.display()
        ))
    })
}

/// Write a manifest in canonical form.
pub fn write_manifest(storage: &dyn Storage, manifest_path: &Path, manifest: &Manifest) -> Result<()> {
    let value = serde_json::to_value(manifest)?;
    storage.write_string(manifest_path, &canonical_json(&value))?;
    Ok(())
}

/// Canonical JSON: object keys recursively sorted, 2-space indentation,
/// trailing newline. Stable across versions by contract.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, 0, &mut out);
    out.push('\n');
    out
}

/// Canonical bytes of a manifest with the integrity block stripped; this is
/// what the integrity digest always covers.
pub fn canonical_payload_bytes(manifest: &Manifest) -> Result<Vec<u8>> {
    let mut value = serde_json::to_value(manifest)?;
    if let Value::Object(map) = &mut value {
        map.remove("manifest_integrity");
    }
    Ok(canonical_json(&value).into_bytes())
}

fn write_canonical(value: &Value, depth: usize, out: &mut String) {
    match value {
        Value::Object(map) if map.is_empty() => out.push_str("{}"),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push_str("{\n");
            for (i, key) in keys.iter().enumerate() {
                indent(depth + 1, out);
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push_str(": ");
                write_canonical(&map[*key], depth + 1, out);
                if i + 1 < keys.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            indent(depth, out);
            out.push('}');
        }
        Value::Array(items) if items.is_empty() => out.push_str("[]"),
        Value::Array(items) => {
            out.push_str("[\n");
            for (i, item) in items.iter().enumerate() {
                indent(depth + 1, out);
                write_canonical(item, depth + 1, out);
                if i + 1 < items.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            indent(depth, out);
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn indent(depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}
