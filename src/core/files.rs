//! File management on top of the record store and the auto-save manager

use std::sync::Arc;

use super::autosave::{default_file_name, AutoSaveManager};
use super::clock::Clock;
use super::document::EditorContent;
use super::store::{FileEntry, FileRecord, KeyedRecordStore, StoreError, StoreResult};

/// Create, open, rename and delete stored files
pub struct FileManager {
    store: Arc<KeyedRecordStore>,
    autosave: Arc<AutoSaveManager>,
    editor: Arc<dyn EditorContent>,
    clock: Arc<dyn Clock>,
}

impl FileManager {
    pub fn new(
        store: Arc<KeyedRecordStore>,
        autosave: Arc<AutoSaveManager>,
        editor: Arc<dyn EditorContent>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            autosave,
            editor,
            clock,
        }
    }

    pub fn autosave(&self) -> &Arc<AutoSaveManager> {
        &self.autosave
    }

    /// Start a fresh, empty file and make it current
    ///
    /// The empty record is written straight away so the file shows up in
    /// listings before anything is typed. A generated name never collides
    /// with an existing file. The buffer and current name are left alone if
    /// the write fails. Returns the name used.
    pub fn create_new_file(&self, name: Option<&str>) -> StoreResult<String> {
        let record = FileRecord::new(String::new(), self.clock.now());
        let name = match name.map(str::trim) {
            Some("") => return Err(StoreError::InvalidName(String::new())),
            Some(name) => {
                self.store.upsert(name, record)?;
                name.to_string()
            }
            None => self
                .store
                .insert_new(&default_file_name(self.clock.as_ref()), record)?,
        };

        self.autosave.switch_file(&name, || self.editor.set_value(""));
        tracing::info!("Created file '{}'", name);
        Ok(name)
    }

    /// Load a stored file into the editor and make it current
    ///
    /// Returns the loaded content, or `None` if there is no such file.
    pub fn open_file(&self, name: &str) -> StoreResult<Option<String>> {
        let Some(record) = self.store.get(name) else {
            tracing::debug!("Open of missing file '{}'", name);
            return Ok(None);
        };

        self.autosave
            .switch_file(name, || self.editor.set_value(&record.content));
        if let Err(e) = self.store.touch_open(name, self.clock.now()) {
            tracing::warn!("Failed to record open time for '{}': {}", name, e);
        }
        tracing::info!("Opened file '{}'", name);
        Ok(Some(record.content))
    }

    /// Rename a stored file; the current file name follows if it matched
    pub fn rename_file(&self, old_name: &str, new_name: &str) -> StoreResult<bool> {
        let renamed = self.autosave.rename_file(old_name, new_name)?;
        if renamed {
            tracing::info!("Renamed file '{}' to '{}'", old_name, new_name.trim());
        }
        Ok(renamed)
    }

    /// Delete a stored file; returns `false` if there was none
    pub fn delete_file(&self, name: &str) -> StoreResult<bool> {
        let removed = self.store.remove(name)?;
        if removed {
            tracing::info!("Deleted file '{}'", name);
        }
        Ok(removed)
    }

    /// Stored files, most recently opened first
    pub fn list_files(&self) -> Vec<FileEntry> {
        self.store.list()
    }
}
