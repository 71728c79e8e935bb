//! The sync run
//!
//! One `Runner` owns one run end to end: download and decrypt the shared
//! medium, resolve a certificate, resolve a profile per app identifier,
//! verify against the remote authority, and commit exactly the files the
//! run touched. The working directory is removed on every exit path.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::Utc;
use tracing::{info, warn};

use gantry_core::layout::{cert_path, find_certificate_bundles, find_profiles, key_path, profile_path};
use gantry_core::{ChangeSet, ProfilePayload};
use gantry_crypto::{Cipher, CryptoError, EncryptionBackend, OpensslEncryption, PasswordSource};
use gantry_portal::RemoteSnapshot;
use gantry_storage::{SaveOutcome, StorageBackend, WorkingCopy};

use crate::drift;
use crate::error::{Result, SyncError};
use crate::generator::Generator;
use crate::installer::Installer;
use crate::output::ResolvedProfile;
use crate::policy::SyncPolicy;

/// What a completed run did and resolved
#[derive(Debug)]
pub struct SyncReport {
    /// Resolved signing identifiers, one per app identifier
    pub resolved: Vec<ResolvedProfile>,

    /// Files the run created or modified, relative to the working copy
    pub changed_files: Vec<PathBuf>,

    /// Commit outcome; `None` when nothing was persisted (readonly or an
    /// empty change set)
    pub outcome: Option<SaveOutcome>,
}

/// Builds the cipher for a resolved password; swapped out in tests
type CipherFactory = Box<dyn Fn(String) -> Box<dyn Cipher> + Send + Sync>;

/// Drives one synchronization run
pub struct Runner {
    policy: SyncPolicy,
    storage: Box<dyn StorageBackend>,
    snapshot: RemoteSnapshot,
    generator: Box<dyn Generator>,
    installer: Box<dyn Installer>,
    password_source: Option<Box<dyn PasswordSource>>,
    cipher_factory: CipherFactory,
}

impl Runner {
    /// Assemble a run; `password_source` is `None` when the shared medium is
    /// stored unencrypted
    pub fn new(
        policy: SyncPolicy,
        storage: Box<dyn StorageBackend>,
        snapshot: RemoteSnapshot,
        generator: Box<dyn Generator>,
        installer: Box<dyn Installer>,
        password_source: Option<Box<dyn PasswordSource>>,
    ) -> Self {
        Self {
            policy,
            storage,
            snapshot,
            generator,
            installer,
            password_source,
            cipher_factory: Box::new(|password| {
                Box::new(EncryptionBackend::Openssl(OpensslEncryption::new(password)))
                    as Box<dyn Cipher>
            }),
        }
    }

    /// Run to completion
    ///
    /// The working directory is removed before this returns, on success and
    /// on every failure path.
    pub async fn run(mut self) -> Result<SyncReport> {
        self.policy.validate()?;
        info!(
            cred_type = %self.policy.cred_type,
            platform = %self.policy.platform,
            storage = %self.storage.description(),
            readonly = self.policy.readonly,
            "Starting credential sync"
        );

        let work = self.storage.download().await?;
        let result = self.execute(&work).await;
        if let Err(err) = work.clear() {
            warn!(error = %err, "Failed to remove the working directory");
        }
        result
    }

    async fn execute(&mut self, work: &WorkingCopy) -> Result<SyncReport> {
        let encryption = self.decrypt(work)?;

        let mut changes = ChangeSet::new();
        let certificate_id = self.ensure_certificate(work, &mut changes).await?;

        let mut resolved = Vec::new();
        for app_identifier in self.policy.app_identifiers.clone() {
            let resolution = self
                .ensure_profile(work, &app_identifier, &certificate_id, &mut changes)
                .await?;
            resolved.push(resolution);
        }

        let outcome = if !changes.is_empty() && !self.policy.readonly {
            encryption.encrypt_files(work.path(), changes.files())?;
            let message = format!(
                "[gantry] Updated {} and platform {}",
                self.policy.cred_type, self.policy.platform
            );
            let outcome = self
                .storage
                .save_changes(work, changes.files(), &[], &message)
                .await?;
            info!(files = changes.len(), "Persisted changes to the shared medium");
            Some(outcome)
        } else {
            info!("Nothing to persist");
            None
        };

        Ok(SyncReport {
            resolved,
            changed_files: changes.into_files(),
            outcome,
        })
    }

    /// Decrypt the working copy, retrying once after a wrong password
    fn decrypt(&self, work: &WorkingCopy) -> Result<Box<dyn Cipher>> {
        let Some(source) = &self.password_source else {
            return Ok(Box::new(EncryptionBackend::None));
        };

        let password = source.resolve()?;
        let cipher = (self.cipher_factory)(password);
        match cipher.decrypt_files(work.path()) {
            Ok(()) => Ok(cipher),
            Err(CryptoError::WrongPassword) => {
                warn!("Stored password failed to decrypt, requesting a fresh one");
                source.clear_cached();
                let password = source.resolve()?;
                let cipher = (self.cipher_factory)(password);
                cipher.decrypt_files(work.path())?;
                Ok(cipher)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Resolve the run's certificate; runs once per sync
    async fn ensure_certificate(
        &mut self,
        work: &WorkingCopy,
        changes: &mut ChangeSet,
    ) -> Result<String> {
        let cred_type = self.policy.cred_type;
        let bundles = find_certificate_bundles(work.path(), cred_type);
        let valid_ids: BTreeSet<String> = self
            .snapshot
            .certificates()
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();

        if let Some(bundle) = bundles.iter().find(|b| valid_ids.contains(&b.certificate_id)) {
            info!(certificate = %bundle.certificate_id, "Reusing stored certificate");
            if !self.installer.is_certificate_installed(bundle) {
                self.installer.install_certificate(bundle)?;
            }
            return Ok(bundle.certificate_id.clone());
        }

        if !bundles.is_empty() {
            let stored: Vec<&str> = bundles.iter().map(|b| b.certificate_id.as_str()).collect();
            return Err(SyncError::FatalConfiguration(format!(
                "Stored {cred_type} certificates [{}] are no longer valid on the remote \
                 authority; remove them with the destructive cleanup and re-run",
                stored.join(", ")
            )));
        }

        if self.policy.readonly {
            return Err(SyncError::FatalConfiguration(format!(
                "No {cred_type} certificate is stored and the run is readonly; \
                 re-run without readonly to create one"
            )));
        }

        let bundle =
            self.generator
                .generate_certificate(cred_type, self.policy.platform, work.path())?;
        changes.add(cert_path(cred_type, &bundle.certificate_id));
        changes.add(key_path(cred_type, &bundle.certificate_id));
        self.installer.install_certificate(&bundle)?;
        Ok(bundle.certificate_id)
    }

    /// Resolve one app identifier's profile
    ///
    /// Loops through the regeneration states: a missing or drifted file is
    /// regenerated, a stored file whose UUID the remote authority no longer
    /// recognizes as valid is deleted on both sides and regenerated. A
    /// freshly generated profile is trusted as-is; the remote view was
    /// snapshotted before it existed.
    async fn ensure_profile(
        &mut self,
        work: &WorkingCopy,
        app_identifier: &str,
        certificate_id: &str,
        changes: &mut ChangeSet,
    ) -> Result<ResolvedProfile> {
        let cred_type = self.policy.cred_type;
        let platform = self.policy.platform;
        let relative = profile_path(cred_type, app_identifier, platform).ok_or_else(|| {
            SyncError::FatalConfiguration(format!(
                "{cred_type} credentials carry no provisioning profiles; \
                 drop the app identifier '{app_identifier}' from the request"
            ))
        })?;
        let absolute = work.join(&relative);
        let mut regenerated = false;

        loop {
            let exists = absolute.is_file();

            let mut force = false;
            if exists && !regenerated {
                force = self.policy.force;
                if !force {
                    let payload = ProfilePayload::parse(&absolute)?;
                    force =
                        drift::should_force_regenerate(&self.policy, &payload, &mut self.snapshot)
                            .await?;
                }
            }

            if !exists || force {
                if self.policy.readonly {
                    let stored: Vec<String> = find_profiles(work.path(), cred_type)
                        .iter()
                        .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
                        .map(str::to_string)
                        .collect();
                    return Err(SyncError::FatalConfiguration(format!(
                        "No usable {cred_type} profile for '{app_identifier}' and the run is \
                         readonly. Stored profiles of this type: [{}]",
                        stored.join(", ")
                    )));
                }
                self.generator.generate_profile(
                    cred_type,
                    platform,
                    app_identifier,
                    certificate_id,
                    self.policy.include_all_certificates,
                    &absolute,
                )?;
                changes.add(relative.clone());
                regenerated = true;
                continue;
            }

            let payload = ProfilePayload::parse(&absolute)?;

            if !self.policy.readonly && !regenerated {
                match self.snapshot.profile_by_uuid(&payload.uuid).await? {
                    Some(remote) if remote.is_valid(Utc::now()) => {}
                    stale => {
                        if let Some(remote) = stale {
                            info!(
                                profile = %remote.name,
                                "Stored profile is invalid on the remote authority, deleting it"
                            );
                            self.snapshot.client().delete_profile(&remote.id).await?;
                        } else {
                            info!(
                                uuid = %payload.uuid,
                                "Stored profile is unknown to the remote authority"
                            );
                        }
                        std::fs::remove_file(&absolute)?;
                        continue;
                    }
                }
            }

            let installed = self.installer.install_profile(&absolute, &payload)?;
            info!(app_identifier, uuid = %payload.uuid, "Profile resolved");
            return Ok(ResolvedProfile {
                app_identifier: app_identifier.to_string(),
                uuid: payload.uuid,
                team_id: payload.team_id,
                name: payload.name,
                path: installed,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use gantry_core::{CertificateBundle, CredentialType, Platform};
    use gantry_portal::{BundleId, Certificate, Device, PortalClient, Profile};

    // In-memory shared medium. Two runs against the same instance see each
    // other's committed files, which is what the idempotence tests need.
    #[derive(Default)]
    struct MemoryStorage {
        state: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
        commits: Arc<Mutex<Vec<Vec<PathBuf>>>>,
        last_work_dir: Arc<Mutex<Option<PathBuf>>>,
        // Simulates a rejected push from a concurrent writer.
        reject_commits: bool,
    }

    impl MemoryStorage {
        fn seeded(files: &[(&str, &[u8])]) -> Self {
            let storage = Self::default();
            {
                let mut state = storage.state.lock().unwrap();
                for (path, content) in files {
                    state.insert(PathBuf::from(path), content.to_vec());
                }
            }
            storage
        }

        fn stored_paths(&self) -> Vec<PathBuf> {
            let mut paths: Vec<PathBuf> = self.state.lock().unwrap().keys().cloned().collect();
            paths.sort();
            paths
        }
    }

    #[async_trait]
    impl StorageBackend for MemoryStorage {
        async fn download(&self) -> gantry_storage::Result<WorkingCopy> {
            let work = WorkingCopy::empty()?;
            for (path, content) in self.state.lock().unwrap().iter() {
                let target = work.join(path);
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(target, content)?;
            }
            *self.last_work_dir.lock().unwrap() = Some(work.path().to_path_buf());
            Ok(work)
        }

        async fn save_changes(
            &self,
            work: &WorkingCopy,
            files_to_commit: &[PathBuf],
            files_to_delete: &[PathBuf],
            _message: &str,
        ) -> gantry_storage::Result<SaveOutcome> {
            if files_to_commit.is_empty() && files_to_delete.is_empty() {
                return Ok(SaveOutcome::NothingToCommit);
            }
            if self.reject_commits {
                return Err(gantry_storage::StorageError::ConflictingWrite(
                    "push rejected, the remote has new commits".into(),
                ));
            }
            let mut state = self.state.lock().unwrap();
            for file in files_to_commit {
                state.insert(file.clone(), std::fs::read(work.join(file))?);
            }
            for file in files_to_delete {
                state.remove(file);
            }
            self.commits.lock().unwrap().push(files_to_commit.to_vec());
            Ok(SaveOutcome::Committed)
        }

        fn description(&self) -> String {
            "in-memory".into()
        }

        fn storage_key(&self) -> String {
            "in-memory".into()
        }
    }

    #[derive(Default)]
    struct StubClient {
        certificates: Vec<Certificate>,
        profiles: Vec<Profile>,
        devices: Vec<Device>,
        deleted_profiles: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl PortalClient for StubClient {
        async fn certificates(&self, _kinds: &[&str]) -> gantry_portal::Result<Vec<Certificate>> {
            Ok(self.certificates.clone())
        }
        async fn profiles(
            &self,
            _kind: &str,
            _include_devices: bool,
            _include_certificates: bool,
        ) -> gantry_portal::Result<Vec<Profile>> {
            Ok(self.profiles.clone())
        }
        async fn devices(&self, _platform: Platform) -> gantry_portal::Result<Vec<Device>> {
            Ok(self.devices.clone())
        }
        async fn bundle_ids(&self, _identifiers: &[String]) -> gantry_portal::Result<Vec<BundleId>> {
            Ok(Vec::new())
        }
        async fn delete_profile(&self, id: &str) -> gantry_portal::Result<()> {
            self.deleted_profiles.lock().unwrap().push(id.to_string());
            Ok(())
        }
        async fn revoke_certificate(&self, _id: &str) -> gantry_portal::Result<()> {
            Ok(())
        }
    }

    // Generator that writes plausible artifacts straight into the working
    // directory.
    struct StubGenerator {
        certificate_id: String,
        profile_uuid: String,
        profile_devices: Vec<String>,
        certificate_calls: Arc<AtomicUsize>,
        profile_calls: Arc<AtomicUsize>,
    }

    impl StubGenerator {
        fn new(certificate_id: &str, profile_uuid: &str, devices: &[&str]) -> Self {
            Self {
                certificate_id: certificate_id.into(),
                profile_uuid: profile_uuid.into(),
                profile_devices: devices.iter().map(|s| s.to_string()).collect(),
                certificate_calls: Arc::new(AtomicUsize::new(0)),
                profile_calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl Generator for StubGenerator {
        fn generate_certificate(
            &self,
            cred_type: CredentialType,
            _platform: Platform,
            work_dir: &Path,
        ) -> Result<CertificateBundle> {
            self.certificate_calls.fetch_add(1, Ordering::SeqCst);
            let cert = work_dir.join(cert_path(cred_type, &self.certificate_id));
            let key = work_dir.join(key_path(cred_type, &self.certificate_id));
            std::fs::create_dir_all(cert.parent().unwrap())?;
            std::fs::write(&cert, b"certificate")?;
            std::fs::write(&key, b"private key")?;
            Ok(CertificateBundle {
                certificate_id: self.certificate_id.clone(),
                certificate_path: cert,
                private_key_path: key,
            })
        }

        fn generate_profile(
            &self,
            _cred_type: CredentialType,
            _platform: Platform,
            app_identifier: &str,
            _certificate_id: &str,
            _include_all_certificates: bool,
            output_path: &Path,
        ) -> Result<()> {
            self.profile_calls.fetch_add(1, Ordering::SeqCst);
            std::fs::create_dir_all(output_path.parent().unwrap())?;
            std::fs::write(
                output_path,
                profile_bytes(&self.profile_uuid, app_identifier, &self.profile_devices),
            )?;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingInstaller {
        certificates: Arc<Mutex<Vec<String>>>,
        profiles: Arc<Mutex<Vec<String>>>,
    }

    impl Installer for RecordingInstaller {
        fn is_certificate_installed(&self, bundle: &CertificateBundle) -> bool {
            self.certificates
                .lock()
                .unwrap()
                .contains(&bundle.certificate_id)
        }
        fn install_certificate(&self, bundle: &CertificateBundle) -> Result<()> {
            self.certificates
                .lock()
                .unwrap()
                .push(bundle.certificate_id.clone());
            Ok(())
        }
        fn install_profile(&self, source: &Path, payload: &ProfilePayload) -> Result<PathBuf> {
            self.profiles.lock().unwrap().push(payload.uuid.clone());
            Ok(source.to_path_buf())
        }
    }

    // Hands out passwords in order; an empty queue behaves like a
    // non-interactive run with nothing left to try.
    struct QueuedPasswords {
        queue: Mutex<Vec<String>>,
        resolves: Arc<AtomicUsize>,
        cleared: Arc<AtomicUsize>,
    }

    impl QueuedPasswords {
        fn new(passwords: &[&str]) -> Self {
            Self {
                queue: Mutex::new(passwords.iter().map(|s| s.to_string()).collect()),
                resolves: Arc::new(AtomicUsize::new(0)),
                cleared: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl PasswordSource for QueuedPasswords {
        fn resolve(&self) -> gantry_crypto::Result<String> {
            self.resolves.fetch_add(1, Ordering::SeqCst);
            let mut queue = self.queue.lock().unwrap();
            if queue.is_empty() {
                return Err(CryptoError::Prompt("password queue exhausted".into()));
            }
            Ok(queue.remove(0))
        }

        fn clear_cached(&self) {
            self.cleared.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PasswordCheckingCipher {
        wrong: bool,
    }

    impl Cipher for PasswordCheckingCipher {
        fn decrypt_files(&self, _work_dir: &Path) -> gantry_crypto::Result<()> {
            if self.wrong {
                Err(CryptoError::WrongPassword)
            } else {
                Ok(())
            }
        }

        fn encrypt_files(
            &self,
            _work_dir: &Path,
            _files: &[PathBuf],
        ) -> gantry_crypto::Result<()> {
            Ok(())
        }
    }

    // Cipher factory that accepts exactly one password.
    fn checking_factory(accepted: &str) -> CipherFactory {
        let accepted = accepted.to_string();
        Box::new(move |password| {
            Box::new(PasswordCheckingCipher {
                wrong: password != accepted,
            }) as Box<dyn Cipher>
        })
    }

    fn profile_bytes(uuid: &str, app_identifier: &str, devices: &[String]) -> Vec<u8> {
        let device_entries: String = devices
            .iter()
            .map(|d| format!("        <string>{d}</string>\n"))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
    <key>Name</key>
    <string>Development {app_identifier}</string>
    <key>UUID</key>
    <string>{uuid}</string>
    <key>TeamIdentifier</key>
    <array>
        <string>ABCDE12345</string>
    </array>
    <key>ProvisionedDevices</key>
    <array>
{device_entries}    </array>
</dict>
</plist>"#
        )
        .into_bytes()
    }

    fn valid_certificate(id: &str) -> Certificate {
        Certificate {
            id: id.into(),
            name: "Dev cert".into(),
            certificate_type: "DEVELOPMENT".into(),
            expiration: Some(Utc::now() + Duration::days(90)),
            content: None,
        }
    }

    fn active_profile(id: &str, uuid: &str) -> Profile {
        Profile {
            id: id.into(),
            uuid: uuid.into(),
            name: "Development com.example.app".into(),
            profile_type: "IOS_APP_DEVELOPMENT".into(),
            state: "ACTIVE".into(),
            expiration: Some(Utc::now() + Duration::days(90)),
            device_ids: None,
            certificate_ids: Some(vec!["CERT1".into()]),
        }
    }

    fn policy() -> SyncPolicy {
        SyncPolicy::new(CredentialType::Development, Platform::Ios)
            .app_identifiers(vec!["com.example.app".into()])
    }

    fn snapshot(client: StubClient) -> RemoteSnapshot {
        RemoteSnapshot::new(
            Box::new(client),
            CredentialType::Development,
            Platform::Ios,
            vec!["com.example.app".into()],
        )
    }

    fn runner(
        policy: SyncPolicy,
        storage: MemoryStorage,
        client: StubClient,
        generator: StubGenerator,
    ) -> Runner {
        Runner::new(
            policy,
            Box::new(storage),
            snapshot(client),
            Box::new(generator),
            Box::new(RecordingInstaller::default()),
            None,
        )
    }

    const PROFILE_PATH: &str = "profiles/development/Development_com.example.app.mobileprovision";

    #[tokio::test]
    async fn test_fresh_generation_end_to_end() {
        let storage = MemoryStorage::default();
        let state = storage.state.clone();
        let work_dir = storage.last_work_dir.clone();
        let client = StubClient {
            certificates: vec![valid_certificate("CERT1")],
            ..Default::default()
        };
        let generator = StubGenerator::new("CERT1", "uuid-fresh", &[]);

        let report = runner(policy(), storage, client, generator)
            .run()
            .await
            .unwrap();

        assert_eq!(report.outcome, Some(SaveOutcome::Committed));
        assert_eq!(
            report.changed_files,
            vec![
                PathBuf::from("certs/development/CERT1.cer"),
                PathBuf::from("certs/development/CERT1.p12"),
                PathBuf::from(PROFILE_PATH),
            ]
        );
        assert_eq!(report.resolved.len(), 1);
        assert_eq!(report.resolved[0].uuid, "uuid-fresh");
        assert_eq!(report.resolved[0].team_id.as_deref(), Some("ABCDE12345"));

        // Everything the run touched reached the shared medium.
        assert_eq!(state.lock().unwrap().len(), 3);

        // No plaintext left behind.
        let dir = work_dir.lock().unwrap().clone().unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let storage = MemoryStorage::default();
        let state = storage.state.clone();
        let commits = storage.commits.clone();

        let client = || StubClient {
            certificates: vec![valid_certificate("CERT1")],
            profiles: vec![active_profile("P1", "uuid-fresh")],
            ..Default::default()
        };

        let first = Runner::new(
            policy(),
            Box::new(MemoryStorage {
                state: state.clone(),
                commits: commits.clone(),
                ..Default::default()
            }),
            snapshot(client()),
            Box::new(StubGenerator::new("CERT1", "uuid-fresh", &[])),
            Box::new(RecordingInstaller::default()),
            None,
        );
        first.run().await.unwrap();

        let second_generator = StubGenerator::new("CERT1", "uuid-other", &[]);
        let cert_calls = second_generator.certificate_calls.clone();
        let profile_calls = second_generator.profile_calls.clone();
        let second = Runner::new(
            policy(),
            Box::new(MemoryStorage {
                state: state.clone(),
                commits: commits.clone(),
                ..Default::default()
            }),
            snapshot(client()),
            Box::new(second_generator),
            Box::new(RecordingInstaller::default()),
            None,
        );
        let report = second.run().await.unwrap();

        assert!(report.changed_files.is_empty());
        assert_eq!(report.outcome, None);
        assert_eq!(cert_calls.load(Ordering::SeqCst), 0);
        assert_eq!(profile_calls.load(Ordering::SeqCst), 0);
        assert_eq!(commits.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_readonly_with_missing_certificate_never_mutates() {
        let storage = MemoryStorage::default();
        let state = storage.state.clone();
        let commits = storage.commits.clone();
        let client = StubClient::default();
        let generator = StubGenerator::new("CERT1", "uuid-x", &[]);
        let cert_calls = generator.certificate_calls.clone();

        let err = runner(policy().readonly(true), storage, client, generator)
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::FatalConfiguration(_)));
        assert!(state.lock().unwrap().is_empty());
        assert!(commits.lock().unwrap().is_empty());
        assert_eq!(cert_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_readonly_with_stored_credentials_resolves() {
        let profile = profile_bytes("uuid-fresh", "com.example.app", &[]);
        let storage = MemoryStorage::seeded(&[
            ("certs/development/CERT1.cer", b"certificate"),
            ("certs/development/CERT1.p12", b"private key"),
            (PROFILE_PATH, &profile),
        ]);
        let client = StubClient {
            certificates: vec![valid_certificate("CERT1")],
            ..Default::default()
        };
        let generator = StubGenerator::new("CERT1", "uuid-x", &[]);

        let report = runner(policy().readonly(true), storage, client, generator)
            .run()
            .await
            .unwrap();

        // Readonly skips remote verification and persists nothing.
        assert_eq!(report.resolved[0].uuid, "uuid-fresh");
        assert!(report.changed_files.is_empty());
        assert_eq!(report.outcome, None);
    }

    #[tokio::test]
    async fn test_device_drift_regenerates_exactly_once() {
        let stale = profile_bytes("uuid-old", "com.example.app", &["udid-a".into()]);
        let storage = MemoryStorage::seeded(&[
            ("certs/development/CERT1.cer", b"certificate"),
            ("certs/development/CERT1.p12", b"private key"),
            (PROFILE_PATH, &stale),
        ]);
        let state = storage.state.clone();
        let client = StubClient {
            certificates: vec![valid_certificate("CERT1")],
            profiles: vec![active_profile("P1", "uuid-old")],
            devices: vec![
                Device {
                    id: "D1".into(),
                    udid: "udid-a".into(),
                    name: "iPhone".into(),
                    platform: "IOS".into(),
                    status: "ENABLED".into(),
                },
                Device {
                    id: "D2".into(),
                    udid: "udid-b".into(),
                    name: "iPad".into(),
                    platform: "IOS".into(),
                    status: "ENABLED".into(),
                },
            ],
            ..Default::default()
        };
        let generator = StubGenerator::new("CERT1", "uuid-new", &["udid-a", "udid-b"]);
        let profile_calls = generator.profile_calls.clone();

        let report = runner(
            policy().force_for_new_devices(true),
            storage,
            client,
            generator,
        )
        .run()
        .await
        .unwrap();

        assert_eq!(profile_calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.changed_files, vec![PathBuf::from(PROFILE_PATH)]);
        assert_eq!(report.resolved[0].uuid, "uuid-new");

        // The regenerated profile embeds the full remote device set.
        let committed = state.lock().unwrap()[&PathBuf::from(PROFILE_PATH)].clone();
        let text = String::from_utf8(committed).unwrap();
        assert!(text.contains("udid-a") && text.contains("udid-b"));
    }

    #[tokio::test]
    async fn test_invalid_remote_profile_is_deleted_and_regenerated() {
        let stale = profile_bytes("uuid-stale", "com.example.app", &[]);
        let storage = MemoryStorage::seeded(&[
            ("certs/development/CERT1.cer", b"certificate"),
            ("certs/development/CERT1.p12", b"private key"),
            (PROFILE_PATH, &stale),
        ]);
        let mut invalid = active_profile("P-stale", "uuid-stale");
        invalid.state = "INVALID".into();
        let client = StubClient {
            certificates: vec![valid_certificate("CERT1")],
            profiles: vec![invalid],
            ..Default::default()
        };
        let deleted = client.deleted_profiles.clone();
        let generator = StubGenerator::new("CERT1", "uuid-replacement", &[]);
        let profile_calls = generator.profile_calls.clone();

        let report = runner(policy(), storage, client, generator)
            .run()
            .await
            .unwrap();

        assert_eq!(deleted.lock().unwrap().as_slice(), ["P-stale"]);
        assert_eq!(profile_calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.resolved[0].uuid, "uuid-replacement");
    }

    #[tokio::test]
    async fn test_unknown_profile_uuid_is_regenerated() {
        let ghost = profile_bytes("uuid-ghost", "com.example.app", &[]);
        let storage = MemoryStorage::seeded(&[
            ("certs/development/CERT1.cer", b"certificate"),
            ("certs/development/CERT1.p12", b"private key"),
            (PROFILE_PATH, &ghost),
        ]);
        let client = StubClient {
            certificates: vec![valid_certificate("CERT1")],
            ..Default::default()
        };
        let generator = StubGenerator::new("CERT1", "uuid-real", &[]);

        let report = runner(policy(), storage, client, generator)
            .run()
            .await
            .unwrap();

        assert_eq!(report.resolved[0].uuid, "uuid-real");
        assert_eq!(report.changed_files, vec![PathBuf::from(PROFILE_PATH)]);
    }

    #[tokio::test]
    async fn test_stored_certificate_invalid_on_remote_is_fatal() {
        let storage = MemoryStorage::seeded(&[
            ("certs/development/OLDCERT.cer", b"certificate"),
            ("certs/development/OLDCERT.p12", b"private key"),
        ]);
        // The remote authority knows nothing about OLDCERT.
        let client = StubClient {
            certificates: vec![valid_certificate("CERT9")],
            ..Default::default()
        };
        let generator = StubGenerator::new("CERT9", "uuid-x", &[]);

        let err = runner(policy(), storage, client, generator)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::FatalConfiguration(_)));
    }

    #[tokio::test]
    async fn test_wrong_password_retries_once_and_recovers() {
        let profile = profile_bytes("uuid-fresh", "com.example.app", &[]);
        let storage = MemoryStorage::seeded(&[
            ("certs/development/CERT1.cer", b"certificate"),
            ("certs/development/CERT1.p12", b"private key"),
            (PROFILE_PATH, &profile),
        ]);
        let client = StubClient {
            certificates: vec![valid_certificate("CERT1")],
            ..Default::default()
        };
        let source = QueuedPasswords::new(&["stale", "correct"]);
        let resolves = source.resolves.clone();
        let cleared = source.cleared.clone();

        let mut run = Runner::new(
            policy().readonly(true),
            Box::new(storage),
            snapshot(client),
            Box::new(StubGenerator::new("CERT1", "uuid-x", &[])),
            Box::new(RecordingInstaller::default()),
            Some(Box::new(source)),
        );
        run.cipher_factory = checking_factory("correct");

        let report = run.run().await.unwrap();

        assert_eq!(report.resolved[0].uuid, "uuid-fresh");
        // The cached password failed once, was dropped, and was resolved
        // afresh exactly once.
        assert_eq!(resolves.load(Ordering::SeqCst), 2);
        assert_eq!(cleared.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_wrong_password_is_fatal() {
        let profile = profile_bytes("uuid-fresh", "com.example.app", &[]);
        let storage = MemoryStorage::seeded(&[
            ("certs/development/CERT1.cer", b"certificate"),
            ("certs/development/CERT1.p12", b"private key"),
            (PROFILE_PATH, &profile),
        ]);
        let work_dir = storage.last_work_dir.clone();
        let client = StubClient {
            certificates: vec![valid_certificate("CERT1")],
            ..Default::default()
        };
        let source = QueuedPasswords::new(&["stale", "still-stale"]);
        let resolves = source.resolves.clone();
        let cleared = source.cleared.clone();

        let mut run = Runner::new(
            policy().readonly(true),
            Box::new(storage),
            snapshot(client),
            Box::new(StubGenerator::new("CERT1", "uuid-x", &[])),
            Box::new(RecordingInstaller::default()),
            Some(Box::new(source)),
        );
        run.cipher_factory = checking_factory("correct");

        let err = run.run().await.unwrap_err();

        assert!(matches!(err, SyncError::Crypto(CryptoError::WrongPassword)));
        // One retry, never a third attempt.
        assert_eq!(resolves.load(Ordering::SeqCst), 2);
        assert_eq!(cleared.load(Ordering::SeqCst), 1);
        let dir = work_dir.lock().unwrap().clone().unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_commit_conflict_is_fatal_and_leaves_medium_untouched() {
        let storage = MemoryStorage {
            reject_commits: true,
            ..Default::default()
        };
        let state = storage.state.clone();
        let work_dir = storage.last_work_dir.clone();
        let client = StubClient {
            certificates: vec![valid_certificate("CERT1")],
            ..Default::default()
        };
        let generator = StubGenerator::new("CERT1", "uuid-fresh", &[]);

        let err = runner(policy(), storage, client, generator)
            .run()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::Storage(gantry_storage::StorageError::ConflictingWrite(_))
        ));
        // Nothing merged or persisted; no retry behind the operator's back.
        assert!(state.lock().unwrap().is_empty());
        let dir = work_dir.lock().unwrap().clone().unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_working_directory_removed_on_failure() {
        let storage = MemoryStorage::default();
        let work_dir = storage.last_work_dir.clone();
        let client = StubClient::default();
        let generator = StubGenerator::new("CERT1", "uuid-x", &[]);

        let result = runner(policy().readonly(true), storage, client, generator)
            .run()
            .await;
        assert!(result.is_err());

        let dir = work_dir.lock().unwrap().clone().unwrap();
        assert!(!dir.exists());
    }
}
