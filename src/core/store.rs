//! File records persisted as a single blob in key-value storage
//!
//! Every mutation is a full read-modify-write of the whole mapping, done
//! under one write guard so that a timer save and a user action can never
//! interleave and drop each other's changes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use super::storage::{KeyValueStorage, StorageError};

/// Storage key holding the serialized file mapping
pub const DEFAULT_FILES_KEY: &str = "md_editor_files";

/// One file's persisted content plus metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Full document text at last save
    pub content: String,
    /// When the auto-save loop last wrote this record
    pub save_time: DateTime<Utc>,
    /// When this file was last made current
    pub last_open_time: DateTime<Utc>,
}

impl FileRecord {
    /// Record freshly written and opened at `now`
    pub fn new(content: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            content: content.into(),
            save_time: now,
            last_open_time: now,
        }
    }
}

/// Mapping from file name to record
pub type FileStore = BTreeMap<String, FileRecord>;

/// First of `base`, `base_1`, `base_2`, ... with no record in `files`
pub fn unique_name(base: &str, files: &FileStore) -> String {
    if !files.contains_key(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base}_{n}"))
        .find(|name| !files.contains_key(name))
        .unwrap_or_else(|| base.to_string())
}

/// A named record, as shown in a file list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub record: FileRecord,
}

/// Errors raised by the record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("stored file data is corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),
    #[error("failed to read file data: {0}")]
    ReadFailed(#[source] StorageError),
    #[error("failed to write file data: {0}")]
    WriteFailed(#[from] StorageError),
    #[error("failed to serialize file data: {0}")]
    Serialization(#[source] serde_json::Error),
    #[error("invalid file name: {0:?}")]
    InvalidName(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Record store over a single storage key
pub struct KeyedRecordStore {
    storage: Arc<dyn KeyValueStorage>,
    key: String,
    write_lock: Mutex<()>,
    revision: watch::Sender<u64>,
}

impl KeyedRecordStore {
    /// Create a store using the default files key
    #[allow(dead_code)]
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::with_key(storage, DEFAULT_FILES_KEY)
    }

    /// Create a store persisting under `key`
    pub fn with_key(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            storage,
            key: key.into(),
            write_lock: Mutex::new(()),
            revision,
        }
    }

    /// Watch for persisted changes; the value is a revision counter
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Load every record; missing or corrupt data yields an empty mapping
    pub fn read_all(&self) -> FileStore {
        match self.load() {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!("Treating file data as empty: {}", e);
                FileStore::new()
            }
        }
    }

    /// Replace the persisted mapping with `store`
    #[allow(dead_code)]
    pub fn write_all(&self, store: &FileStore) -> StoreResult<()> {
        let _guard = self.lock();
        self.persist(store)
    }

    /// Look up a single record
    pub fn get(&self, name: &str) -> Option<FileRecord> {
        self.read_all().remove(name)
    }

    /// All records, most recently opened first
    pub fn list(&self) -> Vec<FileEntry> {
        let mut entries: Vec<FileEntry> = self
            .read_all()
            .into_iter()
            .map(|(name, record)| FileEntry { name, record })
            .collect();
        entries.sort_by(|a, b| {
            b.record
                .last_open_time
                .cmp(&a.record.last_open_time)
                .then_with(|| a.name.cmp(&b.name))
        });
        entries
    }

    /// Insert or overwrite the record stored under `name`
    pub fn upsert(&self, name: &str, record: FileRecord) -> StoreResult<()> {
        self.update(|store| {
            store.insert(name.to_string(), record);
            Some(())
        })?;
        Ok(())
    }

    /// Insert `record` under the first free name derived from `base`
    ///
    /// The name is picked and claimed in one read-modify-write, so an
    /// existing file is never overwritten. Returns the name used.
    pub fn insert_new(&self, base: &str, record: FileRecord) -> StoreResult<String> {
        let name = self.update(|store| {
            let name = unique_name(base, store);
            store.insert(name.clone(), record);
            Some(name)
        })?;
        Ok(name.unwrap_or_else(|| base.to_string()))
    }

    /// Move a record to a new name
    ///
    /// Returns `false` without touching storage when `old_name` is absent or
    /// equal to `new_name`. Content and both timestamps are kept as they are.
    /// An existing record under `new_name` is replaced.
    pub fn rename(&self, old_name: &str, new_name: &str) -> StoreResult<bool> {
        if old_name == new_name {
            return Ok(false);
        }
        let renamed = self.update(|store| {
            let record = store.remove(old_name)?;
            if store.insert(new_name.to_string(), record).is_some() {
                tracing::warn!("Rename of '{}' replaced existing file '{}'", old_name, new_name);
            }
            Some(())
        })?;
        Ok(renamed.is_some())
    }

    /// Delete the record under `name`; returns `false` if there was none
    pub fn remove(&self, name: &str) -> StoreResult<bool> {
        let removed = self.update(|store| store.remove(name))?;
        Ok(removed.is_some())
    }

    /// Refresh `last_open_time`; returns `false` if `name` is absent
    pub fn touch_open(&self, name: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let touched = self.update(|store| {
            let record = store.get_mut(name)?;
            record.last_open_time = now;
            Some(())
        })?;
        Ok(touched.is_some())
    }

    /// Read-modify-write under the write guard
    ///
    /// Nothing is persisted when `f` returns `None`.
    fn update<T>(&self, f: impl FnOnce(&mut FileStore) -> Option<T>) -> StoreResult<Option<T>> {
        let _guard = self.lock();
        // Corrupt data is overwritten, but a failed read must not be
        let mut store = match self.load() {
            Ok(store) => store,
            Err(StoreError::Corrupt(e)) => {
                tracing::warn!("Replacing corrupt file data: {}", e);
                FileStore::new()
            }
            Err(e) => return Err(e),
        };
        match f(&mut store) {
            Some(value) => {
                self.persist(&store)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn load(&self) -> StoreResult<FileStore> {
        let raw = self
            .storage
            .get(&self.key)
            .map_err(StoreError::ReadFailed)?;
        match raw {
            Some(raw) => serde_json::from_str(&raw).map_err(StoreError::Corrupt),
            None => Ok(FileStore::new()),
        }
    }

    fn persist(&self, store: &FileStore) -> StoreResult<()> {
        let raw = serde_json::to_string(store).map_err(StoreError::Serialization)?;
        self.storage.set(&self.key, &raw)?;
        self.revision.send_modify(|rev| *rev += 1);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}
