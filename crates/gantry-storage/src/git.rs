//! Git storage backend
//!
//! Drives the system `git` binary directly. Concurrency between writers is
//! left to git's own optimistic model: a rejected push surfaces as
//! [`StorageError::ConflictingWrite`] and the operator re-runs.

use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::backend::{SaveOutcome, StorageBackend, WorkingCopy};
use crate::error::{Result, StorageError};

/// Shared credential repository stored in a git remote
pub struct GitStorage {
    url: String,
    branch: String,
    shallow_clone: bool,
    git_full_name: Option<String>,
    git_user_email: Option<String>,
}

impl GitStorage {
    /// Create a git storage backend
    pub fn new(url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            branch: branch.into(),
            shallow_clone: false,
            git_full_name: None,
            git_user_email: None,
        }
    }

    /// Clone with `--depth 1`
    pub fn shallow(mut self, shallow: bool) -> Self {
        self.shallow_clone = shallow;
        self
    }

    /// Commit author identity for pushes from this machine
    pub fn with_author(mut self, name: Option<String>, email: Option<String>) -> Self {
        self.git_full_name = name;
        self.git_user_email = email;
        self
    }

    /// Run git with terminal prompts disabled, failing on non-zero exit
    fn run_git(&self, args: &[&str], cwd: Option<&Path>) -> Result<std::process::Output> {
        let mut cmd = Command::new("git");
        cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        debug!(command = ?args, "Running git");
        let output = cmd.output()?;

        if !output.status.success() {
            return Err(StorageError::Command {
                command: format!("git {}", args.join(" ")),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(output)
    }

    /// Like `run_git` but tolerates failure, returning the raw output
    fn try_git(&self, args: &[&str], cwd: &Path) -> Result<std::process::Output> {
        let output = Command::new("git")
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .current_dir(cwd)
            .output()?;
        Ok(output)
    }

    fn checkout_branch(&self, work_dir: &Path) -> Result<()> {
        let listing = self.run_git(
            &[
                "--no-pager",
                "branch",
                "--list",
                &format!("origin/{}", self.branch),
                "--no-color",
                "-r",
            ],
            Some(work_dir),
        )?;

        if listing.stdout.iter().any(|b| !b.is_ascii_whitespace()) {
            info!(branch = %self.branch, "Checking out branch");
            self.run_git(&["checkout", &self.branch], Some(work_dir))?;
        } else {
            // A new branch starts as an orphan so it does not inherit the
            // default branch's history.
            info!(branch = %self.branch, "Creating orphan branch");
            self.run_git(&["checkout", "--orphan", &self.branch], Some(work_dir))?;
            self.run_git(&["reset", "--hard"], Some(work_dir))?;
        }
        Ok(())
    }

    fn configure_author(&self, work_dir: &Path) -> Result<()> {
        if let Some(name) = &self.git_full_name {
            self.run_git(&["config", "user.name", name], Some(work_dir))?;
        }
        if let Some(email) = &self.git_user_email {
            self.run_git(&["config", "user.email", email], Some(work_dir))?;
        }
        Ok(())
    }

    /// Anything staged in the index?
    fn has_staged_changes(&self, work_dir: &Path) -> Result<bool> {
        // Exit 0 means the index matches HEAD (or an empty tree for a fresh
        // orphan branch), i.e. nothing to commit.
        let output = self.try_git(&["diff", "--cached", "--quiet"], work_dir)?;
        Ok(!output.status.success())
    }
}

#[async_trait]
impl StorageBackend for GitStorage {
    async fn download(&self) -> Result<WorkingCopy> {
        let dir = TempDir::new()?;
        let target = dir.path().to_str().ok_or_else(|| {
            StorageError::Configuration("Working directory path is not valid UTF-8".into())
        })?;

        let mut args = vec!["clone", self.url.as_str(), target];
        if self.shallow_clone {
            args.extend(["--depth", "1", "--no-single-branch"]);
        }

        info!(url = %self.url, "Cloning credential repository");
        self.run_git(&args, None).map_err(|e| match e {
            StorageError::Command { stderr, .. } => StorageError::DownloadFailed {
                backend: self.description(),
                reason: format!(
                    "clone failed, make sure you have read access to the repository: {stderr}"
                ),
            },
            other => other,
        })?;

        let work = WorkingCopy::new(dir);
        self.configure_author(work.path())?;
        if self.branch != "master" && self.branch != "main" {
            self.checkout_branch(work.path())?;
        }
        Ok(work)
    }

    async fn save_changes(
        &self,
        work: &WorkingCopy,
        files_to_commit: &[PathBuf],
        files_to_delete: &[PathBuf],
        message: &str,
    ) -> Result<SaveOutcome> {
        for file in files_to_commit {
            let rel = file.to_str().ok_or_else(|| {
                StorageError::Configuration(format!("Non-UTF-8 path: {}", file.display()))
            })?;
            self.run_git(&["add", rel], Some(work.path()))?;
        }
        for file in files_to_delete {
            let rel = file.to_str().ok_or_else(|| {
                StorageError::Configuration(format!("Non-UTF-8 path: {}", file.display()))
            })?;
            self.run_git(&["rm", "--ignore-unmatch", rel], Some(work.path()))?;
        }

        if !self.has_staged_changes(work.path())? {
            info!("Working copy matches remote baseline, nothing to commit");
            return Ok(SaveOutcome::NothingToCommit);
        }

        self.run_git(&["commit", "-m", message], Some(work.path()))?;

        info!(branch = %self.branch, "Pushing changes to remote git repo");
        let push = self.try_git(&["push", "origin", &self.branch], work.path())?;
        if !push.status.success() {
            let stderr = String::from_utf8_lossy(&push.stderr).to_string();
            if stderr.contains("rejected") || stderr.contains("non-fast-forward") {
                return Err(StorageError::ConflictingWrite(stderr));
            }
            return Err(StorageError::Command {
                command: format!("git push origin {}", self.branch),
                status: push.status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(SaveOutcome::Committed)
    }

    fn description(&self) -> String {
        format!("Git Repo [{}]", self.url)
    }

    fn storage_key(&self) -> String {
        self.url.clone()
    }
}
