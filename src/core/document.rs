//! Editor buffers the auto-save core reads from and loads into

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};

/// The live editor buffer, owned by the editor component
pub trait EditorContent: Send + Sync {
    /// Current buffer text
    fn get_content(&self) -> String;

    /// Replace the buffer text
    fn set_value(&self, content: &str);
}

/// Plain in-memory buffer
#[derive(Debug, Default)]
pub struct EditorBuffer {
    content: RwLock<String>,
}

impl EditorBuffer {
    /// Create a buffer holding `content`
    #[allow(dead_code)]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: RwLock::new(content.into()),
        }
    }
}

impl EditorContent for EditorBuffer {
    fn get_content(&self) -> String {
        self.content
            .read()
            .map(|c| c.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    fn set_value(&self, content: &str) {
        let mut buf = self.content.write().unwrap_or_else(|e| e.into_inner());
        buf.clear();
        buf.push_str(content);
    }
}

/// A markdown file on disk acting as the editor buffer
///
/// Whatever an external editor last wrote to the file is what gets
/// auto-saved; loading a record overwrites the file.
#[derive(Debug, Clone)]
pub struct DraftFile {
    path: PathBuf,
}

impl DraftFile {
    /// Bind to `path`, creating an empty file if it does not exist
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            fs::write(path, "")
                .with_context(|| format!("Failed to create draft: {}", path.display()))?;
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EditorContent for DraftFile {
    fn get_content(&self) -> String {
        match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to read draft {}: {}", self.path.display(), e);
                String::new()
            }
        }
    }

    fn set_value(&self, content: &str) {
        if let Err(e) = fs::write(&self.path, content) {
            tracing::error!("Failed to write draft {}: {}", self.path.display(), e);
        }
    }
}
