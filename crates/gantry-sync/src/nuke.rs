//! Destructive reconciliation
//!
//! Deletes credentials of one category everywhere they live: the remote
//! authority, the shared medium, and the working copy. The plan is computed
//! first and executed separately so an interactive caller can narrow it by
//! certificate before anything is touched. Deletion order is remote
//! profiles, then remote certificates, then stored files; a plan with zero
//! candidates is a success.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{info, warn};

use gantry_core::{CredentialType, Platform, ProfilePayload};
use gantry_portal::types::{certificate_kinds, profile_kind, Certificate, Profile};
use gantry_portal::PortalClient;
use gantry_storage::{StorageBackend, WorkingCopy};

use crate::error::Result;

const ALL_PLATFORMS: [Platform; 4] = [
    Platform::Ios,
    Platform::Macos,
    Platform::Tvos,
    Platform::Catalyst,
];

/// Credential categories a nuke of one type covers
///
/// Distribution certificates are shared across the app store, ad-hoc, and
/// Developer ID categories, so nuking any of them must cover all three.
pub fn categories(cred_type: CredentialType) -> Vec<CredentialType> {
    if cred_type.is_distribution() {
        vec![
            CredentialType::AppStore,
            CredentialType::AdHoc,
            CredentialType::DeveloperId,
        ]
    } else {
        vec![cred_type]
    }
}

/// Everything a nuke run intends to delete
#[derive(Debug, Default)]
pub struct NukePlan {
    /// Remote certificates to revoke
    pub certificates: Vec<Certificate>,

    /// Remote profiles to delete
    pub profiles: Vec<Profile>,

    /// Stored files to remove, relative to the working copy
    pub files: Vec<PathBuf>,
}

impl NukePlan {
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty() && self.profiles.is_empty() && self.files.is_empty()
    }

    /// IDs of the certificates in the plan, for interactive narrowing
    pub fn certificate_ids(&self) -> Vec<String> {
        self.certificates.iter().map(|c| c.id.clone()).collect()
    }

    /// Restrict the plan to a subset of its certificates
    ///
    /// Profiles referencing any certificate outside the selection are kept,
    /// as are their stored files. Certificate files are matched by the
    /// certificate ID embedded in the filename, profile files by their
    /// parsed UUID.
    pub fn narrow(self, selected: &BTreeSet<String>, work: &WorkingCopy) -> NukePlan {
        let kept: BTreeSet<String> = self
            .certificates
            .iter()
            .map(|c| c.id.clone())
            .filter(|id| !selected.contains(id))
            .collect();

        let certificates: Vec<Certificate> = self
            .certificates
            .into_iter()
            .filter(|c| selected.contains(&c.id))
            .collect();

        let profiles: Vec<Profile> = self
            .profiles
            .into_iter()
            .filter(|p| {
                let refs = p.certificate_ids.as_deref().unwrap_or_default();
                refs.iter().any(|id| selected.contains(id))
                    && !refs.iter().any(|id| kept.contains(id))
            })
            .collect();

        let doomed_uuids: BTreeSet<&str> = profiles.iter().map(|p| p.uuid.as_str()).collect();
        let files: Vec<PathBuf> = self
            .files
            .into_iter()
            .filter(|file| {
                match file.extension().and_then(|e| e.to_str()) {
                    Some("cer") | Some("p12") => file
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .map(|stem| selected.contains(stem))
                        .unwrap_or(false),
                    Some("mobileprovision") | Some("provisionprofile") => {
                        match ProfilePayload::parse(&work.join(file)) {
                            Ok(payload) => doomed_uuids.contains(payload.uuid.as_str()),
                            Err(err) => {
                                warn!(
                                    file = %file.display(),
                                    error = %err,
                                    "Unreadable stored profile kept out of the narrowed plan"
                                );
                                false
                            }
                        }
                    }
                    _ => false,
                }
            })
            .collect();

        NukePlan {
            certificates,
            profiles,
            files,
        }
    }
}

/// What a nuke run deleted
#[derive(Debug, Default, PartialEq, Eq)]
pub struct NukeSummary {
    pub profiles_deleted: usize,
    pub certificates_revoked: usize,
    pub files_removed: usize,
}

/// Computes and executes deletion plans
pub struct NukeRunner {
    client: Box<dyn PortalClient>,
    storage: Box<dyn StorageBackend>,
}

impl NukeRunner {
    pub fn new(client: Box<dyn PortalClient>, storage: Box<dyn StorageBackend>) -> Self {
        Self { client, storage }
    }

    /// Collect every remote and stored credential the nuke would delete
    ///
    /// The working copy must already be downloaded and decrypted.
    pub async fn plan(&self, work: &WorkingCopy, cred_type: CredentialType) -> Result<NukePlan> {
        let categories = categories(cred_type);

        let mut cert_kinds: Vec<&str> = Vec::new();
        for category in &categories {
            for &kind in certificate_kinds(*category) {
                if !cert_kinds.contains(&kind) {
                    cert_kinds.push(kind);
                }
            }
        }
        let certificates = self.client.certificates(&cert_kinds).await?;

        let mut profile_kinds: Vec<&str> = Vec::new();
        for category in &categories {
            for platform in ALL_PLATFORMS {
                if let Some(kind) = profile_kind(*category, platform) {
                    if !profile_kinds.contains(&kind) {
                        profile_kinds.push(kind);
                    }
                }
            }
        }
        let mut profiles: Vec<Profile> = Vec::new();
        for kind in profile_kinds {
            for profile in self.client.profiles(kind, false, true).await? {
                if !profiles.iter().any(|p| p.id == profile.id) {
                    profiles.push(profile);
                }
            }
        }

        let mut files: Vec<PathBuf> = Vec::new();
        for category in &categories {
            let dir_name = category.to_string();
            for extension in gantry_core::layout::CREDENTIAL_EXTENSIONS {
                for path in self.storage.list_files(work, &dir_name, extension) {
                    if let Ok(relative) = path.strip_prefix(work.path()) {
                        files.push(relative.to_path_buf());
                    }
                }
            }
        }
        files.sort();

        info!(
            certificates = certificates.len(),
            profiles = profiles.len(),
            files = files.len(),
            "Computed deletion plan"
        );
        Ok(NukePlan {
            certificates,
            profiles,
            files,
        })
    }

    /// Execute a plan
    ///
    /// With `safe_remove` the remote certificates are left unrevoked; only
    /// their stored copies disappear.
    pub async fn execute(
        &self,
        work: &WorkingCopy,
        plan: NukePlan,
        safe_remove: bool,
    ) -> Result<NukeSummary> {
        if plan.is_empty() {
            info!("Nothing to delete");
            return Ok(NukeSummary::default());
        }

        let mut summary = NukeSummary::default();

        for profile in &plan.profiles {
            info!(profile = %profile.name, "Deleting remote profile");
            self.client.delete_profile(&profile.id).await?;
            summary.profiles_deleted += 1;
        }

        for certificate in &plan.certificates {
            if safe_remove {
                info!(certificate = %certificate.id, "Leaving remote certificate unrevoked");
            } else {
                info!(certificate = %certificate.id, "Revoking remote certificate");
                self.client.revoke_certificate(&certificate.id).await?;
                summary.certificates_revoked += 1;
            }
        }

        for file in &plan.files {
            let path = work.join(file);
            if path.is_file() {
                std::fs::remove_file(&path)?;
            }
            summary.files_removed += 1;
        }

        if !plan.files.is_empty() {
            let message = format!("Remove {} credential files", plan.files.len());
            self.storage
                .save_changes(work, &[], &plan.files, &message)
                .await?;
        }

        info!(
            profiles = summary.profiles_deleted,
            certificates = summary.certificates_revoked,
            files = summary.files_removed,
            "Nuke complete"
        );
        Ok(summary)
    }
}
