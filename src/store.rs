//! Local record store
//!
//! One pretty-printed JSON file per record, grouped by namespace:
//! `{root}/{namespace}/{key}.json`. Writes go to a `.tmp` sibling and are
//! renamed into place, so a reader never sees a half-written record.
//!
//! There is no file locking. Two writers updating the same key race and the
//! last rename wins; nothing here detects that.

use crate::error::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const RECORD_EXTENSION: &str = "json";

/// Record groups, each mapped to its own directory under the store root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Agreements,
    ProofLogs,
    ProofHistory,
    ProofExports,
    Verifications,
    Telemetry,
}

impl Namespace {
    pub fn dir_name(self) -> &'static str {
        match self {
            Namespace::Agreements => "agreements",
            Namespace::ProofLogs => "logs",
            Namespace::ProofHistory => "history",
            Namespace::ProofExports => "exports",
            Namespace::Verifications => "verification",
            Namespace::Telemetry => "mining",
        }
    }
}

/// Filesystem-backed key-value store for JSON records.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to create store root {:?}: {}", root, e),
            ))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `key` in `namespace`.
    pub fn path_for(&self, namespace: Namespace, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self
            .root
            .join(namespace.dir_name())
            .join(format!("{}.{}", key, RECORD_EXTENSION)))
    }

    /// Write a record, replacing any previous value. Returns the file path.
    pub fn put<T: Serialize>(
        &self,
        namespace: Namespace,
        key: &str,
        record: &T,
    ) -> Result<PathBuf, StorageError> {
        let path = self.path_for(namespace, key)?;
        let temp_path = path.with_extension(format!("{}.tmp", RECORD_EXTENSION));

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create directory {:?}: {}", parent, e),
                ))
            })?;
        }

        let serialized =
            serde_json::to_vec_pretty(record).map_err(|e| StorageError::Serialization {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        fs::write(&temp_path, &serialized).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to write record to {:?}: {}", temp_path, e),
            ))
        })?;

        fs::rename(&temp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to rename temp file to {:?}: {}", path, e),
            ))
        })?;

        debug!(namespace = namespace.dir_name(), key, "Stored record");
        Ok(path)
    }

    /// Read a record. `None` when the key has never been written.
    pub fn get<T: DeserializeOwned>(
        &self,
        namespace: Namespace,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        let path = self.path_for(namespace, key)?;
        if !path.exists() {
            return Ok(None);
        }
        read_record(&path, key).map(Some)
    }

    pub fn exists(&self, namespace: Namespace, key: &str) -> Result<bool, StorageError> {
        Ok(self.path_for(namespace, key)?.exists())
    }

    /// All records in a namespace as `(key, record)` pairs, sorted by key.
    ///
    /// Files that fail to parse are logged and skipped.
    pub fn list<T: DeserializeOwned>(
        &self,
        namespace: Namespace,
    ) -> Result<Vec<(String, T)>, StorageError> {
        let dir = self.root.join(namespace.dir_name());
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            match read_record(&path, &key) {
                Ok(record) => records.push((key, record)),
                Err(err) => warn!(path = %path.display(), error = %err, "Skipping unreadable record"),
            }
        }
        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records)
    }
}

fn read_record<T: DeserializeOwned>(path: &Path, key: &str) -> Result<T, StorageError> {
    let bytes = fs::read(path).map_err(|e| {
        StorageError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to read record from {:?}: {}", path, e),
        ))
    })?;
    serde_json::from_slice(&bytes).map_err(|e| StorageError::Deserialization {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Keys become file names; keep them to a safe character set.
fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}
