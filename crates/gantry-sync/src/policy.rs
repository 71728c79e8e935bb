//! Run policy

use gantry_core::{CredentialType, Platform};

use crate::error::{Result, SyncError};

/// Everything a sync run is allowed and required to do
///
/// Built once per run and never mutated afterwards; the per-iteration force
/// decisions in the runner are local to the iteration.
#[derive(Debug, Clone)]
pub struct SyncPolicy {
    /// Credential type to synchronize
    pub cred_type: CredentialType,

    /// Target platform for provisioning profiles
    pub platform: Platform,

    /// App identifiers to resolve profiles for
    pub app_identifiers: Vec<String>,

    /// Never create, modify, or commit anything
    pub readonly: bool,

    /// Regenerate profiles unconditionally
    pub force: bool,

    /// Regenerate device-scoped profiles when the remote device set changed
    pub force_for_new_devices: bool,

    /// Regenerate development profiles when the remote certificate set
    /// changed; only honored together with `include_all_certificates`
    pub force_for_new_certificates: bool,

    /// Embed every valid development certificate in generated profiles
    pub include_all_certificates: bool,
}

impl SyncPolicy {
    /// Policy with everything off, for one credential type and platform
    pub fn new(cred_type: CredentialType, platform: Platform) -> Self {
        Self {
            cred_type,
            platform,
            app_identifiers: Vec::new(),
            readonly: false,
            force: false,
            force_for_new_devices: false,
            force_for_new_certificates: false,
            include_all_certificates: false,
        }
    }

    pub fn app_identifiers(mut self, identifiers: Vec<String>) -> Self {
        self.app_identifiers = identifiers;
        self
    }

    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn force_for_new_devices(mut self, force: bool) -> Self {
        self.force_for_new_devices = force;
        self
    }

    pub fn force_for_new_certificates(mut self, force: bool) -> Self {
        self.force_for_new_certificates = force;
        self
    }

    pub fn include_all_certificates(mut self, include: bool) -> Self {
        self.include_all_certificates = include;
        self
    }

    /// Reject combinations a run cannot satisfy
    pub fn validate(&self) -> Result<()> {
        if self.readonly && self.force {
            return Err(SyncError::FatalConfiguration(
                "'readonly' and 'force' are mutually exclusive".into(),
            ));
        }
        if self.app_identifiers.is_empty() && self.cred_type.profile_prefix().is_some() {
            return Err(SyncError::FatalConfiguration(format!(
                "At least one app identifier is required to sync {} profiles",
                self.cred_type
            )));
        }
        if self
            .app_identifiers
            .iter()
            .any(|id| id.trim().is_empty())
        {
            return Err(SyncError::FatalConfiguration(
                "App identifiers must not be empty".into(),
            ));
        }
        Ok(())
    }
}
