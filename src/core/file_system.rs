//! Moving stored files to and from markdown files on disk

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

use super::clock::Clock;
use super::store::{FileRecord, KeyedRecordStore};

/// Check if a path looks like a markdown file
pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext == "md" || ext == "markdown")
        .unwrap_or(false)
}

/// Get all markdown files in a directory recursively
pub fn get_markdown_files(path: &Path) -> Vec<PathBuf> {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_markdown(e.path()))
        .map(|e| e.path().to_path_buf())
        .collect()
}

/// Import every markdown file under `dir`, named by file stem
///
/// Existing records with the same name are overwritten. Returns how many
/// files were imported.
pub fn import_dir(store: &KeyedRecordStore, clock: &dyn Clock, dir: &Path) -> Result<usize> {
    if !dir.is_dir() {
        anyhow::bail!("Not a directory: {}", dir.display());
    }

    let mut imported = 0;
    for path in get_markdown_files(dir) {
        let Some(name) = path.file_stem().map(|s| s.to_string_lossy().trim().to_string()) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        store.upsert(&name, FileRecord::new(content, clock.now()))?;
        tracing::debug!("Imported {} as '{}'", path.display(), name);
        imported += 1;
    }

    tracing::info!("Imported {} files from {}", imported, dir.display());
    Ok(imported)
}

/// Write every stored file to `<dir>/<name>.md`
///
/// Names that sanitize to the same file get ` (2)`, ` (3)`, ... appended.
/// Returns the number of files written.
pub fn export_dir(store: &KeyedRecordStore, dir: &Path) -> Result<usize> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    // Compared case-insensitively so the result holds on any filesystem
    let mut used = HashSet::new();
    let mut written = 0;
    for (name, record) in store.read_all() {
        let base = sanitize_file_name(&name);
        let mut stem = base.clone();
        let mut n = 2;
        while !used.insert(stem.to_lowercase()) {
            stem = format!("{base} ({n})");
            n += 1;
        }
        if stem != base {
            tracing::warn!("Exporting '{}' as '{}.md' to avoid a name clash", name, stem);
        }

        let path = dir.join(format!("{stem}.md"));
        std::fs::write(&path, &record.content)
            .with_context(|| format!("Failed to write file: {}", path.display()))?;
        written += 1;
    }

    tracing::info!("Exported {} files to {}", written, dir.display());
    Ok(written)
}

/// Replace characters that cannot appear in a single path component
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match cleaned.trim_matches('.') {
        "" => "untitled".to_string(),
        s => s.to_string(),
    }
}
