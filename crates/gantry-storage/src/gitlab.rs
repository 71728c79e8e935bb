//! GitLab secure-files backend
//!
//! Stores each credential file as a project "secure file", named by its
//! relative repository path. Intended for CI jobs that already hold a
//! `CI_JOB_TOKEN`.

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::backend::{SaveOutcome, StorageBackend, WorkingCopy};
use crate::error::{Result, StorageError};

/// Token presented to the GitLab API
#[derive(Debug, Clone)]
pub enum GitLabToken {
    /// `CI_JOB_TOKEN`, sent as `JOB-TOKEN`
    Job(String),
    /// Personal/project access token, sent as `PRIVATE-TOKEN`
    Private(String),
}

impl GitLabToken {
    /// Resolve a token from the conventional CI environment
    pub fn from_env() -> Option<Self> {
        if let Ok(token) = std::env::var("PRIVATE_TOKEN") {
            return Some(Self::Private(token));
        }
        std::env::var("CI_JOB_TOKEN").ok().map(Self::Job)
    }

    fn header(&self) -> (&'static str, &str) {
        match self {
            Self::Job(token) => ("JOB-TOKEN", token),
            Self::Private(token) => ("PRIVATE-TOKEN", token),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SecureFile {
    id: u64,
    name: String,
}

/// Shared credential repository stored as GitLab secure files
pub struct GitLabSecureFiles {
    api_v4_url: String,
    project_id: String,
    token: GitLabToken,
    client: Client,
}

impl GitLabSecureFiles {
    /// Create a GitLab secure-files backend
    pub fn new(
        api_v4_url: impl Into<String>,
        project_id: impl Into<String>,
        token: GitLabToken,
    ) -> Self {
        Self {
            api_v4_url: api_v4_url.into(),
            project_id: project_id.into(),
            token,
            client: Client::new(),
        }
    }

    fn files_url(&self) -> String {
        let project = urlencode(&self.project_id);
        format!("{}/projects/{}/secure_files", self.api_v4_url, project)
    }

    async fn list_remote(&self) -> Result<Vec<SecureFile>> {
        let mut files = Vec::new();
        let mut page = 1u32;
        loop {
            let (name, value) = self.token.header();
            let response = self
                .client
                .get(self.files_url())
                .query(&[("per_page", "100"), ("page", &page.to_string())])
                .header(name, value)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(StorageError::Api {
                    status: status.as_u16(),
                    message: response.text().await.unwrap_or_default(),
                });
            }

            let batch: Vec<SecureFile> = response.json().await?;
            let done = batch.len() < 100;
            files.extend(batch);
            if done {
                break;
            }
            page += 1;
        }
        Ok(files)
    }

    async fn download_file(&self, file: &SecureFile) -> Result<Vec<u8>> {
        let (name, value) = self.token.header();
        let url = format!("{}/{}/download", self.files_url(), file.id);
        let response = self.client.get(url).header(name, value).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Api {
                status: status.as_u16(),
                message: format!("downloading secure file '{}'", file.name),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn upload_file(&self, name: &str, data: Vec<u8>) -> Result<()> {
        let part = reqwest::multipart::Part::bytes(data).file_name(name.to_string());
        let form = reqwest::multipart::Form::new()
            .text("name", name.to_string())
            .part("file", part);

        let (header, value) = self.token.header();
        let response = self
            .client
            .post(self.files_url())
            .header(header, value)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    async fn delete_file(&self, id: u64) -> Result<()> {
        let (header, value) = self.token.header();
        let url = format!("{}/{}", self.files_url(), id);
        let response = self.client.delete(url).header(header, value).send().await?;

        let status = response.status();
        // Already gone is fine for a delete.
        if !status.is_success() && status.as_u16() != 404 {
            return Err(StorageError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for GitLabSecureFiles {
    async fn download(&self) -> Result<WorkingCopy> {
        let dir = TempDir::new()?;
        let work = WorkingCopy::new(dir);

        info!(project = %self.project_id, "Downloading GitLab secure files");
        let files = self.list_remote().await.map_err(|e| match e {
            StorageError::Api { status, message } => StorageError::DownloadFailed {
                backend: self.description(),
                reason: format!("API returned {status}: {message}"),
            },
            other => other,
        })?;

        for file in &files {
            debug!(name = %file.name, "Fetching secure file");
            let data = self.download_file(file).await?;
            let target = work.join(&file.name);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(target, data)?;
        }

        Ok(work)
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

        let remote = self.list_remote().await?;
        let find = |name: &str| remote.iter().find(|f| f.name == name).map(|f| f.id);

        for file in files_to_commit {
            let name = file.to_str().ok_or_else(|| {
                StorageError::Configuration(format!("Non-UTF-8 path: {}", file.display()))
            })?;
            // Secure files are immutable; replace means delete + upload.
            if let Some(id) = find(name) {
                self.delete_file(id).await?;
            }
            let data = std::fs::read(work.join(file))?;
            self.upload_file(name, data).await?;
        }

        for file in files_to_delete {
            let name = file.to_str().ok_or_else(|| {
                StorageError::Configuration(format!("Non-UTF-8 path: {}", file.display()))
            })?;
            if let Some(id) = find(name) {
                self.delete_file(id).await?;
            }
        }

        Ok(SaveOutcome::Committed)
    }

    fn description(&self) -> String {
        format!("GitLab Secure Files [{}]", self.project_id)
    }

    fn storage_key(&self) -> String {
        format!("gitlab_secure_files:{}", self.project_id)
    }
}

/// Minimal percent-encoding for project path identifiers (`group/project`)
fn urlencode(value: &str) -> String {
    value.replace('/', "%2F")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_path_is_encoded() {
        let storage = GitLabSecureFiles::new(
            "https://gitlab.example.com/api/v4",
            "group/certs",
            GitLabToken::Private("token".into()),
        );
        assert_eq!(
            storage.files_url(),
            "https://gitlab.example.com/api/v4/projects/group%2Fcerts/secure_files"
        );
    }

    #[test]
    fn test_token_headers() {
        assert_eq!(
            GitLabToken::Job("j".into()).header(),
            ("JOB-TOKEN", "j")
        );
        assert_eq!(
            GitLabToken::Private("p".into()).header(),
            ("PRIVATE-TOKEN", "p")
        );
    }
}
