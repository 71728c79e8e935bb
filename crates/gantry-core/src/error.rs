//! Error types for core credential handling

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors from parsing and laying out credential files
#[derive(Debug, Error)]
pub enum CoreError {
    /// Provisioning profile has no embedded plist payload
    #[error("No plist payload found in provisioning profile {0}")]
    MissingPayload(PathBuf),

    /// Required plist key is missing or has the wrong type
    #[error("Provisioning profile {path} is missing required key '{key}'")]
    MissingKey { path: PathBuf, key: &'static str },

    /// Credential type has no provisioning profile category
    #[error("Credential type '{0}' does not use provisioning profiles")]
    NoProfileCategory(String),

    /// Plist decoding error
    #[error("Plist error: {0}")]
    Plist(#[from] plist::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
