//! Per-run snapshot of the remote authority
//!
//! Remote queries are expensive (pagination), and one sync run may consult
//! the same collections several times. Each query is fetched at most once,
//! on first use, and never refreshed mid-run: the run operates on a single
//! consistent view. A snapshot belongs to exactly one run and is constructed
//! fresh; callers receive copies and cannot mutate the cache.

use chrono::Utc;
use tracing::debug;

use gantry_core::{CredentialType, Platform};

use crate::client::PortalClient;
use crate::error::Result;
use crate::types::{certificate_kinds, profile_kind, BundleId, Certificate, Device, Profile};

/// Lazily populated, memoized view of the remote authority for one run
pub struct RemoteSnapshot {
    client: Box<dyn PortalClient>,
    cred_type: CredentialType,
    platform: Platform,
    app_identifiers: Vec<String>,

    certificates: Option<Vec<Certificate>>,
    profiles: Option<Vec<Profile>>,
    devices: Option<Vec<Device>>,
    bundle_ids: Option<Vec<BundleId>>,
}

impl RemoteSnapshot {
    /// Create an empty snapshot for one run
    pub fn new(
        client: Box<dyn PortalClient>,
        cred_type: CredentialType,
        platform: Platform,
        app_identifiers: Vec<String>,
    ) -> Self {
        Self {
            client,
            cred_type,
            platform,
            app_identifiers,
            certificates: None,
            profiles: None,
            devices: None,
            bundle_ids: None,
        }
    }

    /// Valid (non-expired) certificates usable for this run's credential type
    pub async fn certificates(&mut self) -> Result<Vec<Certificate>> {
        if self.certificates.is_none() {
            debug!(cred_type = %self.cred_type, "Fetching certificates from remote authority");
            let now = Utc::now();
            let all = self
                .client
                .certificates(certificate_kinds(self.cred_type))
                .await?;
            self.certificates = Some(
                all.into_iter()
                    .filter(|cert| cert.is_valid(now))
                    .collect(),
            );
        }
        Ok(self.certificates.clone().unwrap_or_default())
    }

    /// Profiles of this run's category, expanded with device and certificate
    /// relationships
    pub async fn profiles(&mut self) -> Result<Vec<Profile>> {
        if self.profiles.is_none() {
            let fetched = match profile_kind(self.cred_type, self.platform) {
                Some(kind) => {
                    debug!(kind, "Fetching profiles from remote authority");
                    self.client.profiles(kind, true, true).await?
                }
                None => Vec::new(),
            };
            self.profiles = Some(fetched);
        }
        Ok(self.profiles.clone().unwrap_or_default())
    }

    /// Enabled devices for this run's platform
    pub async fn devices(&mut self) -> Result<Vec<Device>> {
        if self.devices.is_none() {
            debug!(platform = %self.platform, "Fetching devices from remote authority");
            self.devices = Some(self.client.devices(self.platform).await?);
        }
        Ok(self.devices.clone().unwrap_or_default())
    }

    /// Bundle IDs for this run's app identifiers
    pub async fn bundle_ids(&mut self) -> Result<Vec<BundleId>> {
        if self.bundle_ids.is_none() {
            debug!("Fetching bundle IDs from remote authority");
            self.bundle_ids = Some(self.client.bundle_ids(&self.app_identifiers).await?);
        }
        Ok(self.bundle_ids.clone().unwrap_or_default())
    }

    /// Look up a cached profile by its UUID
    pub async fn profile_by_uuid(&mut self, uuid: &str) -> Result<Option<Profile>> {
        let profiles = self.profiles().await?;
        Ok(profiles.into_iter().find(|p| p.uuid == uuid))
    }

    /// Hand the client back, e.g. for deletions after the snapshot served
    /// its purpose
    pub fn client(&self) -> &dyn PortalClient {
        self.client.as_ref()
    }
}
