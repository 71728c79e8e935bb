//! Sync engine error types

use thiserror::Error;

/// Errors raised by the synchronization engine
#[derive(Error, Debug)]
pub enum SyncError {
    /// The policy makes the requested run impossible; nothing was mutated
    #[error("Configuration error: {0}")]
    FatalConfiguration(String),

    /// The remote authority refused to create a credential because the
    /// account is at its limit
    #[error("Remote authority quota exceeded: {0}\nRevoke unused certificates or profiles from the developer account, or run the destructive cleanup, then retry")]
    QuotaExceeded(String),

    /// A generator subprocess failed
    #[error("Generator command '{command}' failed with {status}: {stderr}")]
    Generator {
        command: String,
        status: String,
        stderr: String,
    },

    /// A generator subprocess did not produce the artifact it was asked for
    #[error("Generator command '{command}' completed but produced no {expected}")]
    GeneratorOutputMissing {
        command: String,
        expected: &'static str,
    },

    /// A local installer subprocess failed
    #[error("Installer command '{command}' failed with {status}: {stderr}")]
    Installer {
        command: String,
        status: String,
        stderr: String,
    },

    /// Storage backend failure
    #[error(transparent)]
    Storage(#[from] gantry_storage::StorageError),

    /// Encryption backend failure
    #[error(transparent)]
    Crypto(#[from] gantry_crypto::CryptoError),

    /// Remote authority failure
    #[error(transparent)]
    Portal(#[from] gantry_portal::PortalError),

    /// Credential parsing or layout failure
    #[error(transparent)]
    Core(#[from] gantry_core::CoreError),

    /// Filesystem failure inside the working directory
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
