//! Resolved run output
//!
//! Downstream build tooling consumes the run's result as named values in
//! the process environment, keyed deterministically by app identifier and
//! credential type. The naming matches the historical convention so build
//! scripts keep working across tools.

use std::path::PathBuf;

use tracing::debug;

use gantry_core::{CredentialType, Platform};

/// Resolved signing identifiers for one app identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProfile {
    /// App identifier this resolution belongs to
    pub app_identifier: String,

    /// UUID of the resolved provisioning profile
    pub uuid: String,

    /// Team the profile belongs to
    pub team_id: Option<String>,

    /// Display name of the profile
    pub name: String,

    /// Local path the profile was installed to
    pub path: PathBuf,
}

/// Base key for one `(app identifier, type, platform)` resolution
///
/// The platform suffix is only added off iOS, mirroring the stored file
/// naming.
pub fn env_base(app_identifier: &str, cred_type: CredentialType, platform: Platform) -> String {
    if platform == Platform::Ios {
        format!("gantry_{app_identifier}_{cred_type}")
    } else {
        format!("gantry_{app_identifier}_{cred_type}_{platform}")
    }
}

/// The environment pairs a resolution publishes
pub fn env_pairs(
    resolved: &ResolvedProfile,
    cred_type: CredentialType,
    platform: Platform,
) -> Vec<(String, String)> {
    let base = env_base(&resolved.app_identifier, cred_type, platform);
    let mut pairs = vec![
        (base.clone(), resolved.uuid.clone()),
        (
            format!("{base}_profile-name"),
            resolved.name.clone(),
        ),
        (
            format!("{base}_profile-path"),
            resolved.path.display().to_string(),
        ),
    ];
    if let Some(team_id) = &resolved.team_id {
        pairs.push((format!("{base}_team-id"), team_id.clone()));
    }
    pairs
}

/// Publish resolutions into this process's environment
pub fn publish(resolved: &[ResolvedProfile], cred_type: CredentialType, platform: Platform) {
    for resolution in resolved {
        for (key, value) in env_pairs(resolution, cred_type, platform) {
            debug!(key, "Publishing resolved value");
            std::env::set_var(key, value);
        }
    }
}
