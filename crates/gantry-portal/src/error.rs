//! Error types for remote authority access

use thiserror::Error;

/// Result type alias for portal operations
pub type Result<T> = std::result::Result<T, PortalError>;

/// Remote authority errors
#[derive(Debug, Error)]
pub enum PortalError {
    /// The remote authority could not be reached
    ///
    /// Fatal to the run; nothing local has been mutated when queries fail.
    #[error("Remote authority unreachable: {0}")]
    Unavailable(String),

    /// Authentication with the remote authority failed
    #[error("Remote authority rejected the credentials: {0}")]
    Auth(String),

    /// The API returned an error response
    #[error("Remote authority API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A requested credential/profile combination is not supported
    #[error("Unsupported combination: {0}")]
    Unsupported(String),

    /// Response could not be decoded
    #[error("Failed to decode remote authority response: {0}")]
    Decode(String),

    /// JWT signing failed
    #[error("Failed to sign API token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// IO error (reading the API key)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for PortalError {
    fn from(err: reqwest::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}
