//! Shared-medium password resolution
//!
//! One password per shared medium, keyed by the storage identifier.
//! Resolution order: environment override, OS secret store, interactive
//! prompt. Batch runs must fail fast instead of hanging on a prompt.

#[cfg(target_os = "macos")]
use std::process::Command;

use tracing::debug;

use crate::error::{CryptoError, Result};

/// Environment variable that overrides all other password sources
pub const PASSWORD_ENV_VAR: &str = "GANTRY_PASSWORD";

/// Where the shared-medium password comes from
///
/// Runs resolve through this trait so batch tests can feed passwords
/// without a keychain or a prompt.
pub trait PasswordSource: Send + Sync {
    /// Produce the current password
    fn resolve(&self) -> Result<String>;

    /// Drop any cached password after a wrong-password failure
    fn clear_cached(&self);
}

/// Resolves and caches the per-storage encryption password
pub struct PasswordStore {
    storage_key: String,
    interactive: bool,
}

impl PasswordStore {
    /// Create a password store for one shared medium
    pub fn new(storage_key: impl Into<String>, interactive: bool) -> Self {
        Self {
            storage_key: storage_key.into(),
            interactive,
        }
    }

    /// Resolve the password: env override, then secret store, then prompt
    pub fn resolve(&self) -> Result<String> {
        if let Ok(password) = std::env::var(PASSWORD_ENV_VAR) {
            if !password.is_empty() {
                debug!("Using encryption password from environment");
                return Ok(password);
            }
        }

        if let Some(password) = keychain_lookup(&self.service_name()) {
            debug!("Using encryption password from OS secret store");
            return Ok(password);
        }

        if !self.interactive {
            return Err(CryptoError::PasswordUnavailable {
                storage_key: self.storage_key.clone(),
                env_var: PASSWORD_ENV_VAR,
            });
        }

        let password = dialoguer::Password::new()
            .with_prompt(format!(
                "Passphrase for credential storage '{}'",
                self.storage_key
            ))
            .interact()
            .map_err(|e| CryptoError::Prompt(e.to_string()))?;

        // Best effort; the prompt result is still usable if caching fails.
        keychain_store(&self.service_name(), &password);
        Ok(password)
    }

    /// Drop the cached password after a wrong-password failure
    pub fn clear_cached(&self) {
        debug!(storage = %self.storage_key, "Clearing cached encryption password");
        keychain_delete(&self.service_name());
    }

    /// Whether a prompt is permitted for this run
    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn service_name(&self) -> String {
        format!("gantry_storage_password:{}", self.storage_key)
    }
}

impl PasswordSource for PasswordStore {
    fn resolve(&self) -> Result<String> {
        PasswordStore::resolve(self)
    }

    fn clear_cached(&self) {
        PasswordStore::clear_cached(self)
    }
}

#[cfg(target_os = "macos")]
fn keychain_lookup(service: &str) -> Option<String> {
    let output = Command::new("security")
        .args(["find-generic-password", "-s", service, "-w"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let password = String::from_utf8(output.stdout).ok()?;
    let trimmed = password.trim_end_matches('\n');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(target_os = "macos")]
fn keychain_store(service: &str, password: &str) {
    let _ = Command::new("security")
        .args([
            "add-generic-password",
            "-U",
            "-s",
            service,
            "-a",
            "gantry",
            "-w",
            password,
        ])
        .output();
}

#[cfg(target_os = "macos")]
fn keychain_delete(service: &str) {
    let _ = Command::new("security")
        .args(["delete-generic-password", "-s", service])
        .output();
}

// No OS secret store wired up off-macOS; env override and prompt remain.
#[cfg(not(target_os = "macos"))]
fn keychain_lookup(_service: &str) -> Option<String> {
    None
}

#[cfg(not(target_os = "macos"))]
fn keychain_store(_service: &str, _password: &str) {}

#[cfg(not(target_os = "macos"))]
fn keychain_delete(_service: &str) {}
