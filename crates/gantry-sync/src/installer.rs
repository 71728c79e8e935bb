//! Local credential installation
//!
//! After a run resolves its credentials they are installed where build
//! tooling finds them: certificates into the login keychain, profiles into
//! the user's provisioning profile directory. On non-macOS hosts the
//! keychain half is a no-op; profile installation is a plain file copy and
//! works everywhere.

use std::path::{Path, PathBuf};
#[cfg(target_os = "macos")]
use std::process::Command;

use tracing::{debug, info};

use gantry_core::{CertificateBundle, ProfilePayload};

use crate::error::Result;
#[cfg(target_os = "macos")]
use crate::error::SyncError;

/// Installs resolved credentials on the local machine
pub trait Installer: Send + Sync {
    /// Whether the certificate is already present locally
    fn is_certificate_installed(&self, bundle: &CertificateBundle) -> bool;

    /// Import the certificate and its private key
    fn install_certificate(&self, bundle: &CertificateBundle) -> Result<()>;

    /// Place the profile where build tooling expects it; returns the
    /// installed path
    fn install_profile(&self, source: &Path, payload: &ProfilePayload) -> Result<PathBuf>;
}

/// Installer backed by the login keychain and the user profile directory
pub struct KeychainInstaller {
    profiles_dir: PathBuf,
}

impl KeychainInstaller {
    pub fn new() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            profiles_dir: home.join("Library/MobileDevice/Provisioning Profiles"),
        }
    }

    /// Override the profile install directory
    pub fn with_profiles_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.profiles_dir = dir.into();
        self
    }
}

impl Default for KeychainInstaller {
    fn default() -> Self {
        Self::new()
    }
}

impl Installer for KeychainInstaller {
    fn is_certificate_installed(&self, bundle: &CertificateBundle) -> bool {
        keychain_has_certificate(&bundle.certificate_id)
    }

    fn install_certificate(&self, bundle: &CertificateBundle) -> Result<()> {
        keychain_import(&bundle.certificate_path)?;
        keychain_import(&bundle.private_key_path)?;
        info!(certificate = %bundle.certificate_id, "Installed certificate into keychain");
        Ok(())
    }

    fn install_profile(&self, source: &Path, payload: &ProfilePayload) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.profiles_dir)?;
        let extension = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mobileprovision");
        let destination = self
            .profiles_dir
            .join(format!("{}.{extension}", payload.uuid));
        std::fs::copy(source, &destination)?;
        debug!(profile = %destination.display(), "Installed provisioning profile");
        Ok(destination)
    }
}

#[cfg(target_os = "macos")]
fn keychain_has_certificate(certificate_id: &str) -> bool {
    Command::new("security")
        .args(["find-certificate", "-c", certificate_id])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(target_os = "macos")]
fn keychain_import(path: &Path) -> Result<()> {
    let output = Command::new("security")
        .arg("import")
        .arg(path)
        .args([
            "-k",
            "login.keychain-db",
            "-P",
            "",
            "-T",
            "/usr/bin/codesign",
            "-T",
            "/usr/bin/security",
        ])
        .output()?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    // Re-importing an existing item is not a failure.
    if !output.status.success() && !stderr.contains("already exists") {
        return Err(SyncError::Installer {
            command: format!("security import {}", path.display()),
            status: output.status.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn keychain_has_certificate(_certificate_id: &str) -> bool {
    false
}

#[cfg(not(target_os = "macos"))]
fn keychain_import(_path: &Path) -> Result<()> {
    debug!("No keychain on this host, skipping certificate import");
    Ok(())
}
