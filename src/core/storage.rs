//! Local key-value storage backends
//!
//! The record store keeps its whole state as one serialized blob under a
//! single key, so a backend only has to support whole-value reads and writes.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised by a storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("storage quota exceeded writing '{key}' ({size} bytes, limit {limit})")]
    QuotaExceeded { key: String, size: usize, limit: usize },
    #[error("invalid storage key '{0}'")]
    InvalidKey(String),
}

/// Synchronous key-value storage primitive
pub trait KeyValueStorage: Send + Sync {
    /// Read the value stored under `key`, if any
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the value stored under `key`
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

fn check_quota(quota: Option<usize>, key: &str, value: &str) -> Result<(), StorageError> {
    match quota {
        Some(limit) if value.len() > limit => Err(StorageError::QuotaExceeded {
            key: key.to_string(),
            size: value.len(),
            limit,
        }),
        _ => Ok(()),
    }
}

/// Storage backed by one file per key inside a data directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    quota: Option<usize>,
}

impl FileStorage {
    /// Open storage rooted at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        tracing::debug!("Opened file storage at {}", root.display());
        Ok(Self { root, quota: None })
    }

    /// Reject any single value larger than `limit` bytes
    pub fn with_quota(mut self, limit: Option<usize>) -> Self {
        self.quota = limit;
        self
    }

    /// Directory holding the stored values
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        check_quota(self.quota, key, value)?;
        let tmp = path.with_extension("json.tmp");
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };

        // Readers never observe a half-written blob
        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(value.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        fs::rename(&tmp, &path).map_err(io_err)?;
        Ok(())
    }
}

/// In-memory storage with an optional size quota
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: std::sync::Mutex<std::collections::HashMap<String, String>>,
    quota: Option<usize>,
    writes: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any single value larger than `limit` bytes
    pub fn with_quota(limit: usize) -> Self {
        Self {
            quota: Some(limit),
            ..Self::default()
        }
    }

    /// Number of successful writes so far
    pub fn writes(&self) -> usize {
        self.writes.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Store a raw value without counting it as a write
    pub fn seed(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }
}

#[cfg(test)]
impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        check_quota(self.quota, key, value)?;
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        self.writes
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}
