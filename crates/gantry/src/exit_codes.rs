//! Exit codes for the CLI

#![allow(dead_code)]

use gantry_sync::SyncError;

/// Success
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// Storage backend error
pub const STORAGE_ERROR: i32 = 3;

/// Remote authority error
pub const REMOTE_ERROR: i32 = 4;

/// Encryption or password error
pub const CRYPTO_ERROR: i32 = 5;

/// User cancelled
pub const CANCELLED: i32 = 130;

/// Map an error to its exit code
pub fn for_error(err: &anyhow::Error) -> i32 {
    if let Some(sync_err) = err.downcast_ref::<SyncError>() {
        return match sync_err {
            SyncError::FatalConfiguration(_) => CONFIG_ERROR,
            SyncError::Storage(_) => STORAGE_ERROR,
            SyncError::Portal(_) | SyncError::QuotaExceeded(_) => REMOTE_ERROR,
            SyncError::Crypto(_) => CRYPTO_ERROR,
            _ => ERROR,
        };
    }
    if err.downcast_ref::<gantry_storage::StorageError>().is_some() {
        return STORAGE_ERROR;
    }
    if err.downcast_ref::<gantry_crypto::CryptoError>().is_some() {
        return CRYPTO_ERROR;
    }
    if err.downcast_ref::<gantry_portal::PortalError>().is_some() {
        return REMOTE_ERROR;
    }
    ERROR
}
