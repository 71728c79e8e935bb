//! Per-run change tracking

use std::path::{Path, PathBuf};

/// Ordered list of working-directory files created or modified during a run
///
/// Owned by one sync run; consumed exactly once when the run commits back to
/// the shared medium.
#[derive(Debug, Default)]
pub struct ChangeSet {
    files: Vec<PathBuf>,
}

impl ChangeSet {
    /// Create an empty change set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a touched file, keeping insertion order and skipping duplicates
    pub fn add(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.files.contains(&path) {
            tracing::debug!(file = %path.display(), "Recorded change");
            self.files.push(path);
        }
    }

    /// Whether anything was touched this run
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of touched files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// View of the touched files
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Consume the change set for committing
    pub fn into_files(self) -> Vec<PathBuf> {
        self.files
    }

    /// Whether a specific file was recorded
    pub fn contains(&self, path: &Path) -> bool {
        self.files.iter().any(|f| f == path)
    }
}
