//! Storage backends for the shared credential medium
//!
//! A backend materializes the encrypted shared repository as a local working
//! copy, persists exactly the changes a run produced, and cleans up after
//! itself. Variants: git repository, S3 object store, GitLab secure files.

pub mod backend;
pub mod error;
pub mod git;
pub mod gitlab;
pub mod registry;
pub mod s3;

pub use backend::{SaveOutcome, StorageBackend, WorkingCopy};
pub use error::{Result, StorageError};
pub use git::GitStorage;
pub use gitlab::GitLabSecureFiles;
pub use registry::{StorageConfig, StorageKind, StorageRegistry};
pub use s3::S3Storage;
