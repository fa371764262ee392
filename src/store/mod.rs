// src/store/mod.rs

//! Persistence layer.
//!
//! The engine only needs a byte-oriented key/value store. Keys are
//! `/`-separated relative names such as `statistics/nas/<uuid>`.
//!
//! - [`FileStore`] keeps one file per key under a root directory, prefixed by
//!   a blake3 checksum line so a damaged record is detected on read.
//! - [`MemoryStore`] keeps everything in a map, for tests and ephemeral use.

use std::fmt::Debug;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::errors::{BackupError, Result};

pub mod codec;
pub mod credentials;
pub mod memory;

pub use credentials::{CredentialStore, Credentials, MemoryCredentialStore};
pub use memory::MemoryStore;

const RECORD_EXTENSION: &str = "rec";
const CHECKSUM_PREFIX: &str = "blake3:";

/// Abstract record storage.
pub trait RecordStore: Send + Sync + Debug {
    fn write(&self, key: &str, bytes: &[u8]) -> Result<()>;
    /// `Ok(None)` when no record exists under `key`.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// All keys starting with `prefix`, sorted.
    fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Reject keys that could escape the store root.
pub fn validate_key(key: &str) -> Result<()> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");

    if bad {
        return Err(BackupError::Storage(format!("invalid record key '{key}'")));
    }
    Ok(())
}

/// Stores records as files under `root`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        let mut path = self.root.clone();
        let (dirs, file) = key.rsplit_once('/').unwrap_or(("", key));
        for segment in dirs.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path.push(format!("{file}.{RECORD_EXTENSION}"));
        Ok(path)
    }
}

impl RecordStore for FileStore {
    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| storage_error("creating directory", parent, e))?;
        }

        // Write next to the target, then rename, so readers never see a
        // half-written record.
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let checksum = blake3::hash(bytes).to_hex();
        {
            let mut file =
                fs::File::create(&tmp).map_err(|e| storage_error("creating", &tmp, e))?;
            writeln!(file, "{CHECKSUM_PREFIX}{checksum}")
                .and_then(|_| file.write_all(bytes))
                .and_then(|_| file.sync_all())
                .map_err(|e| storage_error("writing", &tmp, e))?;
        }
        fs::rename(&tmp, &path).map_err(|e| storage_error("renaming", &path, e))?;

        debug!(key = %key, bytes = bytes.len(), "stored record (file)");
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error("reading", &path, e)),
        };

        let Some(split) = raw.iter().position(|b| *b == b'\n') else {
            warn!(key = %key, "record has no checksum header");
            return Err(BackupError::NotFound(format!("{key} (corrupted record)")));
        };
        let (header, payload) = (&raw[..split], &raw[split + 1..]);

        let expected = std::str::from_utf8(header)
            .ok()
            .and_then(|h| h.strip_prefix(CHECKSUM_PREFIX));
        let actual = blake3::hash(payload).to_hex();

        if expected != Some(actual.as_str()) {
            warn!(key = %key, "record checksum mismatch");
            return Err(BackupError::NotFound(format!("{key} (corrupted record)")));
        }

        Ok(Some(payload.to_vec()))
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        if self.root.is_dir() {
            collect_keys(&self.root, &self.root, &mut keys)?;
        }
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}

fn collect_keys(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| storage_error("listing", dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| storage_error("listing", dir, e))?.path();
        if path.is_dir() {
            collect_keys(root, &path, out)?;
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if let Some(key) = relative.strip_suffix(&format!(".{RECORD_EXTENSION}")) {
            out.push(key.to_string());
        }
    }
    Ok(())
}

fn storage_error(action: &str, path: &Path, err: std::io::Error) -> BackupError {
    BackupError::Storage(format!("{action} {}: {err}", path.display()))
}
