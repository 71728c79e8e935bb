//! Error types for encryption backends

use thiserror::Error;

/// Result type alias for encryption operations
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Encryption backend errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Decryption failed in a way that indicates a wrong password
    ///
    /// Recoverable exactly once: the caller clears the cached password and
    /// retries with a fresh one.
    #[error("Wrong password, could not decrypt the stored credential files")]
    WrongPassword,

    /// The encryption tool itself is unusable
    #[error("Encryption backend unavailable: {0}")]
    Unavailable(String),

    /// No password could be resolved and prompting is not permitted
    #[error("No encryption password available for '{storage_key}' and the run is not interactive; set {env_var}")]
    PasswordUnavailable {
        storage_key: String,
        env_var: &'static str,
    },

    /// Subprocess invocation failed
    #[error("Command '{command}' failed with exit code {status}: {stderr}")]
    Command {
        command: String,
        status: i32,
        stderr: String,
    },

    /// Prompt was cancelled or failed
    #[error("Password prompt failed: {0}")]
    Prompt(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
