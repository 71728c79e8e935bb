//! Typed remote authority entities and category mappings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gantry_core::{CredentialType, Platform};

/// A signing certificate known to the remote authority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    /// Stable certificate ID
    pub id: String,

    /// Display name (common name)
    pub name: String,

    /// Remote certificate category, e.g. `DEVELOPMENT`
    pub certificate_type: String,

    /// Expiration timestamp
    pub expiration: Option<DateTime<Utc>>,

    /// Base64 DER content, when the API returned it
    pub content: Option<String>,
}

impl Certificate {
    /// Not yet expired as of `now`
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expiration.map(|exp| exp > now).unwrap_or(true)
    }
}

/// A provisioning profile known to the remote authority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Stable profile ID
    pub id: String,

    /// Profile UUID, the identity embedded in local files
    pub uuid: String,

    /// Display name
    pub name: String,

    /// Remote profile category, e.g. `IOS_APP_DEVELOPMENT`
    pub profile_type: String,

    /// Lifecycle state, `ACTIVE` or `INVALID`
    pub state: String,

    /// Expiration timestamp
    pub expiration: Option<DateTime<Utc>>,

    /// IDs of provisioned devices, when relationships were requested
    pub device_ids: Option<Vec<String>>,

    /// IDs of embedded certificates, when relationships were requested
    pub certificate_ids: Option<Vec<String>>,
}

impl Profile {
    /// Active and not expired as of `now`
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.state == "ACTIVE" && self.expiration.map(|exp| exp > now).unwrap_or(true)
    }
}

/// A registered device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Stable device ID
    pub id: String,

    /// Hardware UDID
    pub udid: String,

    /// Display name
    pub name: String,

    /// Device platform, e.g. `IOS`
    pub platform: String,

    /// `ENABLED` or `DISABLED`
    pub status: String,
}

/// A registered bundle identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleId {
    /// Stable bundle ID resource identifier
    pub id: String,

    /// The app identifier string, e.g. `com.example.app`
    pub identifier: String,

    /// Display name
    pub name: String,
}

/// Remote certificate categories that satisfy a credential type
pub fn certificate_kinds(cred_type: CredentialType) -> &'static [&'static str] {
    match cred_type {
        CredentialType::Development => &["DEVELOPMENT", "IOS_DEVELOPMENT", "MAC_APP_DEVELOPMENT"],
        CredentialType::AdHoc | CredentialType::AppStore | CredentialType::Enterprise => {
            &["DISTRIBUTION", "IOS_DISTRIBUTION", "MAC_APP_DISTRIBUTION"]
        }
        CredentialType::DeveloperId => &["DEVELOPER_ID_APPLICATION"],
        CredentialType::MacInstallerDistribution => &["MAC_INSTALLER_DISTRIBUTION"],
        CredentialType::DeveloperIdInstaller => &["DEVELOPER_ID_INSTALLER"],
    }
}

/// Remote profile category for a credential type on a platform
///
/// Returns `None` for combinations the remote authority does not issue
/// (installer certificates, ad-hoc on macOS, …).
pub fn profile_kind(cred_type: CredentialType, platform: Platform) -> Option<&'static str> {
    use CredentialType::*;
    use Platform::*;

    let kind = match (cred_type, platform) {
        (Development, Ios) => "IOS_APP_DEVELOPMENT",
        (Development, Macos) => "MAC_APP_DEVELOPMENT",
        (Development, Tvos) => "TVOS_APP_DEVELOPMENT",
        (Development, Catalyst) => "MAC_CATALYST_APP_DEVELOPMENT",
        (AppStore, Ios) => "IOS_APP_STORE",
        (AppStore, Macos) => "MAC_APP_STORE",
        (AppStore, Tvos) => "TVOS_APP_STORE",
        (AppStore, Catalyst) => "MAC_CATALYST_APP_STORE",
        (AdHoc, Ios) => "IOS_APP_ADHOC",
        (AdHoc, Tvos) => "TVOS_APP_ADHOC",
        (Enterprise, Ios) => "IOS_APP_INHOUSE",
        (Enterprise, Tvos) => "TVOS_APP_INHOUSE",
        (DeveloperId, Macos) => "MAC_APP_DIRECT",
        (DeveloperId, Catalyst) => "MAC_CATALYST_APP_DIRECT",
        _ => return None,
    };
    Some(kind)
}

/// Remote device platform filter for a profile platform
pub fn device_platform(platform: Platform) -> &'static str {
    match platform {
        Platform::Ios | Platform::Tvos => "IOS",
        Platform::Macos | Platform::Catalyst => "MAC_OS",
    }
}
