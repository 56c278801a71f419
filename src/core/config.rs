//! Application configuration management

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use super::autosave::DEFAULT_SAVE_INTERVAL;
use super::store::DEFAULT_FILES_KEY;

/// Same limit browsers put on local storage
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Auto-save settings
    pub autosave: AutoSaveConfig,
    /// Storage settings
    pub storage: StorageConfig,
    /// Log level filter (error, warn, info, debug, trace)
    pub log_level: String,
    /// Recently opened files, most recent first
    pub recent_files: Vec<String>,
}

/// Auto-save settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    /// Milliseconds between saves (0 = timer disabled)
    pub interval_ms: u64,
}

/// Storage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory override
    pub data_dir: Option<PathBuf>,
    /// Key the file mapping is stored under
    pub files_key: String,
    /// Largest blob the storage accepts, in bytes (`null` = unlimited)
    pub quota_bytes: Option<usize>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            autosave: AutoSaveConfig::default(),
            storage: StorageConfig::default(),
            log_level: "info".to_string(),
            recent_files: Vec::new(),
        }
    }
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_SAVE_INTERVAL.as_millis() as u64,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            files_key: DEFAULT_FILES_KEY.to_string(),
            quota_bytes: Some(DEFAULT_QUOTA_BYTES),
        }
    }
}

impl AutoSaveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl AppConfig {
    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("com", "markpad", "Markpad")
    }

    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Self::load_from(&path)
    }

    /// Load configuration from a specific file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        self.save_to(&path)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure config directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Add a file to recent files
    pub fn add_recent_file(&mut self, name: &str) {
        // Remove if already exists
        self.recent_files.retain(|n| n != name);
        // Add to front
        self.recent_files.insert(0, name.to_string());
        // Keep only last 10
        self.recent_files.truncate(10);
    }

    /// Rewrite or drop recent-file entries after a rename or delete
    pub fn replace_recent_file(&mut self, old_name: &str, new_name: Option<&str>) {
        match new_name {
            Some(new_name) => {
                for name in &mut self.recent_files {
                    if name == old_name {
                        *name = new_name.to_string();
                    }
                }
                let mut seen = std::collections::HashSet::new();
                self.recent_files.retain(|n| seen.insert(n.clone()));
            }
            None => self.recent_files.retain(|n| n != old_name),
        }
    }

    /// Get the data directory holding stored files
    pub fn get_data_dir(&self) -> PathBuf {
        self.storage.data_dir.clone().unwrap_or_else(|| {
            Self::project_dirs()
                .map(|dirs| dirs.data_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from("data"))
        })
    }
}
