//! Application state and command coordination

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::oneshot;

use crate::core::autosave::AutoSaveManager;
use crate::core::clock::{Clock, SystemClock};
use crate::core::config::AppConfig;
use crate::core::document::{DraftFile, EditorBuffer, EditorContent};
use crate::core::file_system;
use crate::core::files::FileManager;
use crate::core::storage::FileStorage;
use crate::core::store::KeyedRecordStore;

/// Main application state
pub struct MarkpadApp {
    /// Application configuration
    pub config: AppConfig,
    /// Where the configuration is persisted; `None` means the default location
    config_path: Option<PathBuf>,
    /// Stored files
    store: Arc<KeyedRecordStore>,
    /// Time source for record stamps
    clock: Arc<dyn Clock>,
}

impl MarkpadApp {
    /// Open the file store described by `config`
    pub fn new(config: AppConfig, config_path: Option<PathBuf>) -> Result<Self> {
        let data_dir = config.get_data_dir();
        let storage = FileStorage::open(&data_dir)
            .with_context(|| format!("Failed to open data directory: {}", data_dir.display()))?
            .with_quota(config.storage.quota_bytes);
        tracing::info!("Using data directory {}", storage.root().display());

        let store = Arc::new(KeyedRecordStore::with_key(
            Arc::new(storage),
            config.storage.files_key.clone(),
        ));

        Ok(Self {
            config,
            config_path,
            store,
            clock: Arc::new(SystemClock),
        })
    }

    /// Wire a file manager around `editor`
    fn file_manager(&self, editor: Arc<dyn EditorContent>) -> FileManager {
        let autosave = Arc::new(AutoSaveManager::new(
            Arc::clone(&self.store),
            Arc::clone(&editor),
            Arc::clone(&self.clock),
            self.config.autosave.interval(),
        ));
        FileManager::new(Arc::clone(&self.store), autosave, editor, Arc::clone(&self.clock))
    }

    /// File manager over a throwaway in-memory buffer
    fn headless(&self) -> FileManager {
        self.file_manager(Arc::new(EditorBuffer::default()))
    }

    fn save_config(&self) {
        let result = match &self.config_path {
            Some(path) => self.config.save_to(path),
            None => self.config.save(),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to save config: {}", e);
        }
    }

    /// Print every stored file
    pub fn list(&self) {
        let files = self.headless();
        let entries = files.list_files();
        if entries.is_empty() {
            println!("No files");
            return;
        }
        for entry in entries {
            println!(
                "{:<32} saved {}  opened {}  ({} bytes)",
                entry.name,
                entry.record.save_time.format("%Y-%m-%d %H:%M:%S"),
                entry.record.last_open_time.format("%Y-%m-%d %H:%M:%S"),
                entry.record.content.len()
            );
        }
    }

    /// Create an empty file
    pub fn create(&mut self, name: Option<&str>) -> Result<()> {
        let files = self.headless();
        let name = files.create_new_file(name)?;
        println!("Created {name}");
        self.config.add_recent_file(&name);
        self.save_config();
        Ok(())
    }

    /// Print a stored file's content
    pub fn open(&mut self, name: &str) -> Result<()> {
        let files = self.headless();
        let content = files
            .open_file(name)?
            .ok_or_else(|| anyhow::anyhow!("No such file: {name}"))?;
        print!("{content}");
        self.config.add_recent_file(name);
        self.save_config();
        Ok(())
    }

    /// Rename a stored file
    pub fn rename(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        let files = self.headless();
        if !files.rename_file(old_name, new_name)? {
            anyhow::bail!("Cannot rename '{old_name}' to '{new_name}'");
        }
        self.config.replace_recent_file(old_name, Some(new_name.trim()));
        self.save_config();
        Ok(())
    }

    /// Delete a stored file
    pub fn delete(&mut self, name: &str) -> Result<()> {
        let files = self.headless();
        if !files.delete_file(name)? {
            anyhow::bail!("No such file: {name}");
        }
        self.config.replace_recent_file(name, None);
        self.save_config();
        Ok(())
    }

    /// Import markdown files from a directory
    pub fn import(&self, dir: &Path) -> Result<()> {
        let count = file_system::import_dir(&self.store, self.clock.as_ref(), dir)?;
        println!("Imported {count} files");
        Ok(())
    }

    /// Export stored files to a directory
    pub fn export(&self, dir: &Path) -> Result<()> {
        let count = file_system::export_dir(&self.store, dir)?;
        println!("Exported {count} files");
        Ok(())
    }

    /// Auto-save a draft file until interrupted
    ///
    /// With `name`, an empty draft is loaded from the stored file of that
    /// name; a draft that already has text keeps it and saves under `name`.
    pub async fn edit(&mut self, draft: &Path, name: Option<&str>) -> Result<()> {
        let draft = Arc::new(DraftFile::open(draft)?);
        let files = self.file_manager(draft.clone());

        if let Some(name) = name {
            if draft.get_content().is_empty() && files.open_file(name)?.is_some() {
                tracing::info!("Loaded '{}' into {}", name, draft.path().display());
            } else {
                files.autosave().set_file_name(name);
            }
        }
        let current = files.autosave().get_file_name();
        self.config.add_recent_file(&current);
        self.save_config();

        let (ready_tx, ready_rx) = oneshot::channel();
        let startup = files.autosave().start_when_ready(ready_rx);
        let mut changes = self.store.subscribe();

        println!(
            "Auto-saving {} as '{}'. Press Ctrl-C to stop.",
            draft.path().display(),
            current
        );
        let _ = ready_tx.send(());
        startup.await.context("Auto-save startup task failed")?;
        if !files.autosave().is_running() {
            tracing::info!("Auto-save timer is off; saving on exit only");
        }

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        loop {
            tokio::select! {
                result = &mut ctrl_c => {
                    result.context("Failed to listen for Ctrl-C")?;
                    break;
                }
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    tracing::debug!("Store revision {}", *changes.borrow_and_update());
                }
            }
        }

        files.autosave().stop();
        if let Err(e) = files.autosave().save() {
            tracing::error!("Final save failed: {}", e);
        }
        println!("Stopped. Last saved as '{}'", files.autosave().get_file_name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_in(dir: &Path) -> MarkpadApp {
        let mut config = AppConfig::default();
        config.storage.data_dir = Some(dir.join("data"));
        MarkpadApp::new(config, Some(dir.join("config.json"))).unwrap()
    }

    #[test]
    fn test_commands_update_store_and_recent_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_in(dir.path());

        app.create(Some("a")).unwrap();
        app.rename("a", "b").unwrap();
        assert!(app.store.get("b").is_some());
        assert_eq!(app.config.recent_files, ["b"]);

        let saved = AppConfig::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(saved.recent_files, ["b"]);

        app.delete("b").unwrap();
        assert!(app.store.read_all().is_empty());
        assert!(app.config.recent_files.is_empty());
        assert!(app.delete("b").is_err());
        assert!(app.open("b").is_err());
    }

    #[test]
    fn test_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        app_in(dir.path()).create(Some("kept")).unwrap();

        let app = app_in(dir.path());
        assert!(app.store.get("kept").is_some());
    }

    #[test]
    fn test_import_then_export() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(src.join("one.md"), "1").unwrap();

        let app = app_in(dir.path());
        app.import(&src).unwrap();
        app.export(&dir.path().join("out")).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out").join("one.md")).unwrap(),
            "1"
        );
    }
}
