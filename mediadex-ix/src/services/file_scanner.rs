//! Media file scanner
//!
//! Walks the configured roots, classifies each entry by guessing a mime
//! type from its name, and keeps only video, audio, and image files.
//! Unreadable entries are logged and skipped, never fatal; ordering is
//! plain traversal order and not significant.

use chrono::{DateTime, Utc};
use mediadex_common::model::{FileRecord, MimeKind};
use mediadex_common::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Filesystem scanner. All I/O, no catalog access.
pub struct FileScanner {
    ignore_patterns: Vec<String>,
}

impl FileScanner {
    /// Create a scanner with default ignore patterns for system clutter.
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
                "lost+found".to_string(),
            ],
        }
    }

    /// Scan all roots recursively, returning one record per media file.
    pub fn scan(&self, roots: &[PathBuf]) -> Result<Vec<FileRecord>> {
        let mut records = Vec::new();

        for root in roots {
            if !root.is_dir() {
                tracing::warn!("Skipping media root {}: not a directory", root.display());
                continue;
            }
            self.scan_root(root, &mut records);
        }

        tracing::info!(files = records.len(), "Filesystem scan complete");
        Ok(records)
    }

    fn scan_root(&self, root: &Path, records: &mut Vec<FileRecord>) {
        let mut symlink_visited = HashSet::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| self.should_process_entry(e, &mut symlink_visited));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    // Permission error or broken link: skip, keep walking.
                    tracing::warn!("Error accessing entry under {}: {}", root.display(), e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            match self.classify(entry.path()) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", entry.path().display(), e);
                }
            }
        }
    }

    /// Build a record for one path, or None if it is not a media file.
    fn classify(&self, path: &Path) -> std::io::Result<Option<FileRecord>> {
        let Some(mime) = guess_mime(path) else {
            return Ok(None);
        };
        let Some(kind) = MimeKind::from_mime(&mime) else {
            return Ok(None);
        };

        let metadata = std::fs::metadata(path)?;
        let last_modified: DateTime<Utc> = metadata.modified()?.into();

        Ok(Some(FileRecord {
            path: path.to_string_lossy().into_owned(),
            mime_type: mime,
            kind,
            last_modified,
        }))
    }

    fn should_process_entry(
        &self,
        entry: &DirEntry,
        symlink_visited: &mut HashSet<PathBuf>,
    ) -> bool {
        let file_name = entry.file_name().to_string_lossy();

        for pattern in &self.ignore_patterns {
            if file_name.contains(pattern.as_str()) {
                return false;
            }
        }

        // Detect symlink loops
        if entry.file_type().is_symlink() {
            if let Ok(canonical) = entry.path().canonicalize() {
                if !symlink_visited.insert(canonical) {
                    tracing::warn!("Symlink loop detected: {}", entry.path().display());
                    return false;
                }
            }
        }

        true
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Guess a full mime type from the file name alone.
fn guess_mime(path: &Path) -> Option<String> {
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_string())
}
