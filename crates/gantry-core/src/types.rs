//! Credential and platform types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The kind of code signing credential being synchronized
///
/// Determines which remote certificate/profile categories apply and which
/// reuse rules are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    /// Development signing
    Development,
    /// Ad-hoc distribution
    AdHoc,
    /// App Store distribution
    AppStore,
    /// In-house enterprise distribution
    Enterprise,
    /// Developer ID (direct macOS distribution)
    DeveloperId,
    /// Mac Installer distribution certificate
    MacInstallerDistribution,
    /// Developer ID Installer certificate
    DeveloperIdInstaller,
}

impl CredentialType {
    /// All credential types, in declaration order
    pub const ALL: [CredentialType; 7] = [
        Self::Development,
        Self::AdHoc,
        Self::AppStore,
        Self::Enterprise,
        Self::DeveloperId,
        Self::MacInstallerDistribution,
        Self::DeveloperIdInstaller,
    ];

    /// Name prefix used for profile files in the shared medium
    ///
    /// Installer certificate types carry no provisioning profiles.
    pub fn profile_prefix(&self) -> Option<&'static str> {
        match self {
            Self::Development => Some("Development"),
            Self::AdHoc => Some("AdHoc"),
            Self::AppStore => Some("AppStore"),
            Self::Enterprise => Some("InHouse"),
            Self::DeveloperId => Some("DeveloperID"),
            Self::MacInstallerDistribution | Self::DeveloperIdInstaller => None,
        }
    }

    /// Whether profiles of this type embed a device list
    pub fn is_device_scoped(&self) -> bool {
        matches!(self, Self::Development | Self::AdHoc)
    }

    /// Whether this type shares the distribution certificate category
    pub fn is_distribution(&self) -> bool {
        matches!(self, Self::AdHoc | Self::AppStore | Self::DeveloperId)
    }
}

impl std::fmt::Display for CredentialType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::AdHoc => write!(f, "adhoc"),
            Self::AppStore => write!(f, "appstore"),
            Self::Enterprise => write!(f, "enterprise"),
            Self::DeveloperId => write!(f, "developer_id"),
            Self::MacInstallerDistribution => write!(f, "mac_installer_distribution"),
            Self::DeveloperIdInstaller => write!(f, "developer_id_installer"),
        }
    }
}

impl std::str::FromStr for CredentialType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "development" => Ok(Self::Development),
            "adhoc" => Ok(Self::AdHoc),
            "appstore" => Ok(Self::AppStore),
            "enterprise" => Ok(Self::Enterprise),
            "developer_id" => Ok(Self::DeveloperId),
            "mac_installer_distribution" => Ok(Self::MacInstallerDistribution),
            "developer_id_installer" => Ok(Self::DeveloperIdInstaller),
            other => Err(format!("Unknown credential type '{other}'")),
        }
    }
}

/// Target platform for a provisioning profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// iOS / iPadOS
    Ios,
    /// macOS
    Macos,
    /// tvOS
    Tvos,
    /// Mac Catalyst
    Catalyst,
}

impl Platform {
    /// File extension used for provisioning profiles on this platform
    pub fn profile_extension(&self) -> &'static str {
        match self {
            Self::Macos | Self::Catalyst => "provisionprofile",
            Self::Ios | Self::Tvos => "mobileprovision",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ios => write!(f, "ios"),
            Self::Macos => write!(f, "macos"),
            Self::Tvos => write!(f, "tvos"),
            Self::Catalyst => write!(f, "catalyst"),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ios" => Ok(Self::Ios),
            "macos" => Ok(Self::Macos),
            "tvos" => Ok(Self::Tvos),
            "catalyst" => Ok(Self::Catalyst),
            other => Err(format!("Unknown platform '{other}'")),
        }
    }
}

/// A certificate + private key pair stored in the shared medium
///
/// Usable only while both files exist and the certificate is still valid
/// on the remote authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateBundle {
    /// Stable certificate ID assigned by the remote authority
    pub certificate_id: String,

    /// Path to the `.cer` file inside the working directory
    pub certificate_path: PathBuf,

    /// Path to the `.p12` private key inside the working directory
    pub private_key_path: PathBuf,
}

impl CertificateBundle {
    /// Both halves of the pair are present on disk
    pub fn is_complete(&self) -> bool {
        self.certificate_path.is_file() && self.private_key_path.is_file()
    }
}
