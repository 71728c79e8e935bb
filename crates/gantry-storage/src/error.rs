//! Error types for storage backends

use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage backend errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Fetching the shared medium failed; nothing was mutated locally
    #[error("Failed to download shared storage ({backend}): {reason}")]
    DownloadFailed { backend: String, reason: String },

    /// A concurrent writer updated the shared medium first
    ///
    /// Detected through the backend's optimistic-concurrency primitive
    /// (a rejected git push). Not retried automatically; re-run to resolve.
    #[error("Concurrent write conflict, the shared storage was updated by someone else: {0}")]
    ConflictingWrite(String),

    /// Backend rejected the persisted changes
    #[error("Failed to save changes to shared storage: {0}")]
    SaveFailed(String),

    /// Backend configuration is unusable
    #[error("Storage configuration error: {0}")]
    Configuration(String),

    /// Subprocess invocation failed
    #[error("Command '{command}' failed with exit code {status}: {stderr}")]
    Command {
        command: String,
        status: i32,
        stderr: String,
    },

    /// HTTP API error (GitLab secure files)
    #[error("Storage API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
