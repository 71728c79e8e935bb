//! Storage backend registry
//!
//! Backends are keyed by a closed enum rather than free-form strings so the
//! set of supported variants is checkable at compile time; new variants are
//! an explicit extension point here.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::StorageBackend;
use crate::error::{Result, StorageError};
use crate::git::GitStorage;
use crate::gitlab::{GitLabSecureFiles, GitLabToken};
use crate::s3::S3Storage;

/// The closed set of shared-medium variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// Git repository
    Git,
    /// S3 object store
    S3,
    /// GitLab CI secure files
    GitlabSecureFiles,
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Git => write!(f, "git"),
            Self::S3 => write!(f, "s3"),
            Self::GitlabSecureFiles => write!(f, "gitlab_secure_files"),
        }
    }
}

/// Declarative storage configuration, one variant per backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Git repository storage
    Git {
        /// Repository URL
        url: String,
        /// Branch name
        #[serde(default = "default_branch")]
        branch: String,
        /// Clone with `--depth 1`
        #[serde(default)]
        shallow_clone: bool,
        /// Commit author name
        #[serde(default)]
        git_full_name: Option<String>,
        /// Commit author email
        #[serde(default)]
        git_user_email: Option<String>,
    },
    /// S3 bucket storage
    S3 {
        /// Bucket name
        bucket: String,
        /// Prefix (folder) within the bucket
        #[serde(default)]
        prefix: String,
        /// AWS region
        region: String,
    },
    /// GitLab secure files storage
    GitlabSecureFiles {
        /// Base API URL, e.g. `https://gitlab.com/api/v4`
        api_v4_url: String,
        /// Project ID or `group/project` path
        project_id: String,
    },
}

fn default_branch() -> String {
    "main".to_string()
}

impl StorageConfig {
    /// Which backend variant this configuration selects
    pub fn kind(&self) -> StorageKind {
        match self {
            Self::Git { .. } => StorageKind::Git,
            Self::S3 { .. } => StorageKind::S3,
            Self::GitlabSecureFiles { .. } => StorageKind::GitlabSecureFiles,
        }
    }
}

/// Builder function for one backend variant
pub type BackendBuilder = fn(&StorageConfig) -> Result<Box<dyn StorageBackend>>;

/// Registry mapping [`StorageKind`] to backend builders
pub struct StorageRegistry {
    entries: Vec<(StorageKind, BackendBuilder)>,
}

impl StorageRegistry {
    /// Registry with all built-in backends registered
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            entries: Vec::new(),
        };
        registry.register(StorageKind::Git, build_git);
        registry.register(StorageKind::S3, build_s3);
        registry.register(StorageKind::GitlabSecureFiles, build_gitlab);
        registry
    }

    /// Register (or replace) the builder for a kind
    pub fn register(&mut self, kind: StorageKind, builder: BackendBuilder) {
        debug!(backend = %kind, "Registered storage backend");
        self.entries.retain(|(k, _)| *k != kind);
        self.entries.push((kind, builder));
    }

    /// All registered kinds
    pub fn kinds(&self) -> Vec<StorageKind> {
        self.entries.iter().map(|(k, _)| *k).collect()
    }

    /// Construct the backend selected by a configuration
    pub fn build(&self, config: &StorageConfig) -> Result<Box<dyn StorageBackend>> {
        let kind = config.kind();
        let (_, builder) = self
            .entries
            .iter()
            .find(|(k, _)| *k == kind)
            .ok_or_else(|| {
                StorageError::Configuration(format!("No storage backend registered for '{kind}'"))
            })?;
        builder(config)
    }
}

impl Default for StorageRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn build_git(config: &StorageConfig) -> Result<Box<dyn StorageBackend>> {
    let StorageConfig::Git {
        url,
        branch,
        shallow_clone,
        git_full_name,
        git_user_email,
    } = config
    else {
        return Err(StorageError::Configuration(
            "Expected git storage configuration".into(),
        ));
    };
    Ok(Box::new(
        GitStorage::new(url.clone(), branch.clone())
            .shallow(*shallow_clone)
            .with_author(git_full_name.clone(), git_user_email.clone()),
    ))
}

fn build_s3(config: &StorageConfig) -> Result<Box<dyn StorageBackend>> {
    let StorageConfig::S3 {
        bucket,
        prefix,
        region,
    } = config
    else {
        return Err(StorageError::Configuration(
            "Expected s3 storage configuration".into(),
        ));
    };
    Ok(Box::new(S3Storage::new(
        bucket.clone(),
        prefix.clone(),
        region.clone(),
    )))
}

fn build_gitlab(config: &StorageConfig) -> Result<Box<dyn StorageBackend>> {
    let StorageConfig::GitlabSecureFiles {
        api_v4_url,
        project_id,
    } = config
    else {
        return Err(StorageError::Configuration(
            "Expected gitlab_secure_files storage configuration".into(),
        ));
    };
    let token = GitLabToken::from_env().ok_or_else(|| {
        StorageError::Configuration(
            "GitLab secure files requires CI_JOB_TOKEN or PRIVATE_TOKEN".into(),
        )
    })?;
    Ok(Box::new(GitLabSecureFiles::new(
        api_v4_url.clone(),
        project_id.clone(),
        token,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git_config() -> StorageConfig {
        StorageConfig::Git {
            url: "git@example.com:org/certs.git".into(),
            branch: "main".into(),
            shallow_clone: false,
            git_full_name: None,
            git_user_email: None,
        }
    }

    #[test]
    fn test_defaults_cover_all_kinds() {
        let registry = StorageRegistry::with_defaults();
        let kinds = registry.kinds();
        assert!(kinds.contains(&StorageKind::Git));
        assert!(kinds.contains(&StorageKind::S3));
        assert!(kinds.contains(&StorageKind::GitlabSecureFiles));
    }

    #[test]
    fn test_build_git() {
        let registry = StorageRegistry::with_defaults();
        let backend = registry.build(&git_config()).unwrap();
        assert_eq!(
            backend.description(),
            "Git Repo [git@example.com:org/certs.git]"
        );
    }

    #[test]
    fn test_config_kind() {
        assert_eq!(git_config().kind(), StorageKind::Git);
        let s3 = StorageConfig::S3 {
            bucket: "b".into(),
            prefix: "".into(),
            region: "us-east-1".into(),
        };
        assert_eq!(s3.kind(), StorageKind::S3);
    }

    #[test]
    fn test_config_yaml_roundtrip() {
        let yaml = "kind: git\nurl: git@example.com:org/certs.git\nbranch: certs\n";
        let config: StorageConfig = serde_yaml::from_str(yaml).unwrap();
        match &config {
            StorageConfig::Git { url, branch, .. } => {
                assert_eq!(url, "git@example.com:org/certs.git");
                assert_eq!(branch, "certs");
            }
            other => panic!("unexpected config: {other:?}"),
        }
    }
}
