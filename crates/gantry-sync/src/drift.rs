//! Drift detection for stored profiles
//!
//! A stored profile embeds the device and certificate sets it was generated
//! with. When the remote authority's sets have changed since then the
//! profile is stale and must be regenerated. Comparison is strict set
//! equality: a removal on the remote side forces regeneration exactly like
//! an addition. The cost of a false positive is one needless regeneration;
//! the cost of a false negative is an unusable build.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use gantry_core::{CredentialType, ProfilePayload};
use gantry_portal::RemoteSnapshot;

use crate::error::Result;
use crate::policy::SyncPolicy;

/// Decide whether a stored profile must be regenerated because of drift
///
/// Only consulted when neither `readonly` nor `force` already settled the
/// question. Flags that do not apply to the credential type are logged and
/// ignored.
pub async fn should_force_regenerate(
    policy: &SyncPolicy,
    payload: &ProfilePayload,
    snapshot: &mut RemoteSnapshot,
) -> Result<bool> {
    if policy.readonly || policy.force {
        return Ok(false);
    }

    if policy.force_for_new_devices {
        if policy.cred_type.is_device_scoped() {
            if device_drift(payload, snapshot).await? {
                info!(profile = %payload.name, "Device set changed, profile will be regenerated");
                return Ok(true);
            }
        } else {
            warn!(
                cred_type = %policy.cred_type,
                "'force_for_new_devices' ignored, profiles of this type embed no devices"
            );
        }
    }

    if policy.force_for_new_certificates {
        if policy.cred_type == CredentialType::Development && policy.include_all_certificates {
            if certificate_drift(payload, snapshot).await? {
                info!(
                    profile = %payload.name,
                    "Certificate set changed, profile will be regenerated"
                );
                return Ok(true);
            }
        } else {
            warn!(
                "'force_for_new_certificates' ignored, it requires the development type \
                 with 'include_all_certificates'"
            );
        }
    }

    Ok(false)
}

/// Embedded device UDIDs differ from the remote device set
async fn device_drift(payload: &ProfilePayload, snapshot: &mut RemoteSnapshot) -> Result<bool> {
    let local: BTreeSet<&str> = payload
        .provisioned_devices
        .iter()
        .map(String::as_str)
        .collect();
    let devices = snapshot.devices().await?;
    let remote: BTreeSet<&str> = devices.iter().map(|d| d.udid.as_str()).collect();

    debug!(local = local.len(), remote = remote.len(), "Comparing device sets");
    Ok(local != remote)
}

/// Certificates referenced by the remote profile differ from the remote
/// certificate set
async fn certificate_drift(payload: &ProfilePayload, snapshot: &mut RemoteSnapshot) -> Result<bool> {
    let Some(remote_profile) = snapshot.profile_by_uuid(&payload.uuid).await? else {
        // Unknown to the remote authority; verification handles that case.
        return Ok(false);
    };
    let embedded: BTreeSet<String> = remote_profile
        .certificate_ids
        .unwrap_or_default()
        .into_iter()
        .collect();

    let certificates = snapshot.certificates().await?;
    let current: BTreeSet<String> = certificates.into_iter().map(|c| c.id).collect();

    debug!(
        embedded = embedded.len(),
        current = current.len(),
        "Comparing certificate sets"
    );
    Ok(embedded != current)
}
