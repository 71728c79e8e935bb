//! Storage backend contract and the run-owned working copy

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::TempDir;

use crate::error::Result;

/// Ephemeral plaintext materialization of the shared medium
///
/// Owned by exactly one run. The backing temp directory is deleted when the
/// value is dropped, so a killed run never leaves plaintext secrets behind.
#[derive(Debug)]
pub struct WorkingCopy {
    dir: TempDir,
}

impl WorkingCopy {
    /// Wrap a freshly populated temp directory
    pub fn new(dir: TempDir) -> Self {
        Self { dir }
    }

    /// Create an empty working copy
    pub fn empty() -> Result<Self> {
        Ok(Self::new(TempDir::new()?))
    }

    /// Root path of the working directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of a file stored relative to the working directory
    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Discard the working directory without persisting anything
    pub fn clear(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        tracing::debug!(dir = %path.display(), "Clearing working directory");
        self.dir.close()?;
        Ok(())
    }
}

/// Outcome of persisting changes back to the shared medium
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Changes were committed to the shared medium
    Committed,
    /// The working copy matched the remote baseline, nothing persisted
    NothingToCommit,
}

/// Contract every shared-medium variant implements
///
/// All mutation goes through `save_changes` with an explicit file list; the
/// engine never commits the whole working tree.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Fetch the shared medium into a fresh working copy
    ///
    /// Network or auth failure here is fatal to the run; no local state has
    /// been mutated yet.
    async fn download(&self) -> Result<WorkingCopy>;

    /// Persist exactly the given files back to the shared medium
    ///
    /// Paths are relative to the working copy root. Returns
    /// [`SaveOutcome::NothingToCommit`] when the working copy is unchanged
    /// from the remote baseline.
    async fn save_changes(
        &self,
        work: &WorkingCopy,
        files_to_commit: &[PathBuf],
        files_to_delete: &[PathBuf],
        message: &str,
    ) -> Result<SaveOutcome>;

    /// Human-readable description, e.g. for log lines and summaries
    fn description(&self) -> String;

    /// Stable identifier of the shared medium, used to key the encryption
    /// password
    fn storage_key(&self) -> String;

    /// Enumerate stored files whose parent directory matches `dir_name` and
    /// whose extension matches `extension`
    ///
    /// Operates on an already downloaded working copy; used by destructive
    /// operations to find files to remove.
    fn list_files(&self, work: &WorkingCopy, dir_name: &str, extension: &str) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(work.path())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                let in_dir = p
                    .parent()
                    .and_then(|d| d.file_name())
                    .and_then(|n| n.to_str())
                    .map(|n| n == dir_name)
                    .unwrap_or(false);
                let ext_matches = p
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e == extension)
                    .unwrap_or(false);
                in_dir && ext_matches
            })
            .collect();
        files.sort();
        files
    }
}
