//! The client interface the sync engine consumes

use async_trait::async_trait;

use gantry_core::Platform;

use crate::error::Result;
use crate::types::{BundleId, Certificate, Device, Profile};

/// Read/write access to the remote authority
///
/// Implementations own pagination, auth, and wire formats; the engine only
/// sees typed entities. All queries are blocking from the run's perspective.
#[async_trait]
pub trait PortalClient: Send + Sync {
    /// List certificates whose category is in `kinds`
    async fn certificates(&self, kinds: &[&str]) -> Result<Vec<Certificate>>;

    /// List profiles of one category, optionally expanded with device and
    /// certificate relationships
    async fn profiles(
        &self,
        kind: &str,
        include_devices: bool,
        include_certificates: bool,
    ) -> Result<Vec<Profile>>;

    /// List enabled devices for a platform
    async fn devices(&self, platform: Platform) -> Result<Vec<Device>>;

    /// List bundle IDs matching the given app identifiers
    async fn bundle_ids(&self, identifiers: &[String]) -> Result<Vec<BundleId>>;

    /// Delete a provisioning profile
    async fn delete_profile(&self, id: &str) -> Result<()>;

    /// Revoke a certificate
    async fn revoke_certificate(&self, id: &str) -> Result<()>;
}
