//! S3 object-store backend
//!
//! Uses the AWS CLI so credential resolution (instance roles, profiles,
//! environment) stays with the operator's existing setup.

use std::path::PathBuf;
use std::process::Command;

use async_trait::async_trait;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::backend::{SaveOutcome, StorageBackend, WorkingCopy};
use crate::error::{Result, StorageError};

/// Shared credential repository stored in an S3 bucket
pub struct S3Storage {
    bucket: String,
    prefix: String,
    region: String,
}

impl S3Storage {
    /// Create an S3 storage backend
    pub fn new(
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            region: region.into(),
        }
    }

    fn bucket_url(&self, path: &str) -> String {
        if self.prefix.is_empty() {
            format!("s3://{}/{}", self.bucket, path)
        } else {
            format!(
                "s3://{}/{}/{}",
                self.bucket,
                self.prefix.trim_end_matches('/'),
                path
            )
        }
    }

    fn aws_cli(&self, args: &[&str]) -> Result<std::process::Output> {
        debug!(command = ?args, "Running aws");
        let output = Command::new("aws")
            .args(args)
            .env("AWS_DEFAULT_REGION", &self.region)
            .output()?;

        if !output.status.success() {
            return Err(StorageError::Command {
                command: format!("aws {}", args.join(" ")),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    async fn download(&self) -> Result<WorkingCopy> {
        let dir = TempDir::new()?;
        let target = dir.path().to_str().ok_or_else(|| {
            StorageError::Configuration("Working directory path is not valid UTF-8".into())
        })?;

        info!(bucket = %self.bucket, "Downloading credential bucket");
        self.aws_cli(&["s3", "sync", &self.bucket_url(""), target])
            .map_err(|e| match e {
                StorageError::Command { stderr, .. } => StorageError::DownloadFailed {
                    backend: self.description(),
                    reason: stderr,
                },
                other => other,
            })?;

        Ok(WorkingCopy::new(dir))
    }

    async fn save_changes(
        &self,
        work: &WorkingCopy,
        files_to_commit: &[PathBuf],
        files_to_delete: &[PathBuf],
        _message: &str,
    ) -> Result<SaveOutcome> {
        if files_to_commit.is_empty() && files_to_delete.is_empty() {
            return Ok(SaveOutcome::NothingToCommit);
        }

        for file in files_to_commit {
            let rel = file.to_str().ok_or_else(|| {
                StorageError::Configuration(format!("Non-UTF-8 path: {}", file.display()))
            })?;
            let local = work.join(file);
            let local = local.to_str().ok_or_else(|| {
                StorageError::Configuration(format!("Non-UTF-8 path: {}", file.display()))
            })?;
            self.aws_cli(&["s3", "cp", local, &self.bucket_url(rel)])?;
        }

        for file in files_to_delete {
            let rel = file.to_str().ok_or_else(|| {
                StorageError::Configuration(format!("Non-UTF-8 path: {}", file.display()))
            })?;
            self.aws_cli(&["s3", "rm", &self.bucket_url(rel)])?;
        }

        Ok(SaveOutcome::Committed)
    }

    fn description(&self) -> String {
        format!("S3 Bucket [{}/{}]", self.bucket, self.prefix)
    }

    fn storage_key(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }
}
