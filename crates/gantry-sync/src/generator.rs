//! Credential generation
//!
//! The engine never constructs signing requests or profile payloads itself;
//! it delegates to a generator and only cares that the expected files appear
//! in the working directory. The shipped implementation shells out to
//! operator-configured commands, passing the request through the child
//! environment.

use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

use gantry_core::layout::find_certificate_bundles;
use gantry_core::{CertificateBundle, CredentialType, Platform};

use crate::error::{Result, SyncError};

/// Creates new certificates and profiles on the remote authority and writes
/// them into the working directory
pub trait Generator: Send + Sync {
    /// Create a certificate+key pair of the given type
    ///
    /// The new pair must land in the working directory's certificate layout
    /// under `work_dir`, named by the certificate ID the remote authority
    /// assigned.
    fn generate_certificate(
        &self,
        cred_type: CredentialType,
        platform: Platform,
        work_dir: &Path,
    ) -> Result<CertificateBundle>;

    /// Create a provisioning profile and write it to `output_path`
    fn generate_profile(
        &self,
        cred_type: CredentialType,
        platform: Platform,
        app_identifier: &str,
        certificate_id: &str,
        include_all_certificates: bool,
        output_path: &Path,
    ) -> Result<()>;
}

/// Generator that delegates to operator-configured commands
///
/// The request travels through `GANTRY_GEN_*` environment variables; the
/// command is expected to talk to the remote authority and write its output
/// where told.
pub struct ScriptGenerator {
    certificate_command: Vec<String>,
    profile_command: Vec<String>,
}

impl ScriptGenerator {
    pub fn new(certificate_command: Vec<String>, profile_command: Vec<String>) -> Self {
        Self {
            certificate_command,
            profile_command,
        }
    }

    fn run(command: &[String], envs: &[(&str, &str)]) -> Result<()> {
        let Some((program, args)) = command.split_first() else {
            return Err(SyncError::FatalConfiguration(
                "Generator command is not configured".into(),
            ));
        };

        debug!(command = %command.join(" "), "Running generator command");
        let output = Command::new(program)
            .args(args)
            .envs(envs.iter().copied())
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if is_quota_failure(&stderr) {
                return Err(SyncError::QuotaExceeded(stderr));
            }
            return Err(SyncError::Generator {
                command: command.join(" "),
                status: output.status.to_string(),
                stderr,
            });
        }
        Ok(())
    }
}

/// Whether a generator failure is the remote authority's credential limit
fn is_quota_failure(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("quota")
        || lower.contains("maximum number of certificates")
        || lower.contains("maximum number of profiles")
}

impl Generator for ScriptGenerator {
    fn generate_certificate(
        &self,
        cred_type: CredentialType,
        platform: Platform,
        work_dir: &Path,
    ) -> Result<CertificateBundle> {
        let before: BTreeSet<String> = find_certificate_bundles(work_dir, cred_type)
            .into_iter()
            .map(|b| b.certificate_id)
            .collect();

        let output_dir = work_dir.join(gantry_core::layout::certs_dir(cred_type));
        std::fs::create_dir_all(&output_dir)?;

        let type_name = cred_type.to_string();
        let platform_name = format!("{platform}");
        let dir_str = output_dir.display().to_string();
        Self::run(
            &self.certificate_command,
            &[
                ("GANTRY_GEN_KIND", "certificate"),
                ("GANTRY_GEN_TYPE", &type_name),
                ("GANTRY_GEN_PLATFORM", &platform_name),
                ("GANTRY_GEN_OUTPUT_DIR", &dir_str),
            ],
        )?;

        let bundle = find_certificate_bundles(work_dir, cred_type)
            .into_iter()
            .find(|b| !before.contains(&b.certificate_id))
            .ok_or(SyncError::GeneratorOutputMissing {
                command: self.certificate_command.join(" "),
                expected: "certificate+key pair",
            })?;

        info!(certificate = %bundle.certificate_id, "Generated new certificate");
        Ok(bundle)
    }

    fn generate_profile(
        &self,
        cred_type: CredentialType,
        platform: Platform,
        app_identifier: &str,
        certificate_id: &str,
        include_all_certificates: bool,
        output_path: &Path,
    ) -> Result<()> {
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let type_name = cred_type.to_string();
        let platform_name = format!("{platform}");
        let output_str = output_path.display().to_string();
        let all_certs = if include_all_certificates { "1" } else { "0" };
        Self::run(
            &self.profile_command,
            &[
                ("GANTRY_GEN_KIND", "profile"),
                ("GANTRY_GEN_TYPE", &type_name),
                ("GANTRY_GEN_PLATFORM", &platform_name),
                ("GANTRY_GEN_APP_IDENTIFIER", app_identifier),
                ("GANTRY_GEN_CERTIFICATE_ID", certificate_id),
                ("GANTRY_GEN_ALL_CERTIFICATES", all_certs),
                ("GANTRY_GEN_OUTPUT", &output_str),
            ],
        )?;

        if !output_path.is_file() {
            return Err(SyncError::GeneratorOutputMissing {
                command: self.profile_command.join(" "),
                expected: "provisioning profile",
            });
        }

        info!(app_identifier, "Generated new provisioning profile");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_detection() {
        assert!(is_quota_failure(
            "error: You have reached the maximum number of certificates"
        ));
        assert!(is_quota_failure("API quota exhausted for this team"));
        assert!(!is_quota_failure("connection reset by peer"));
    }

    #[test]
    fn test_empty_command_is_configuration_error() {
        let gen = ScriptGenerator::new(vec![], vec![]);
        let dir = tempfile::tempdir().unwrap();
        let err = gen
            .generate_certificate(CredentialType::Development, Platform::Ios, dir.path())
            .unwrap_err();
        assert!(matches!(err, SyncError::FatalConfiguration(_)));
    }

    #[test]
    fn test_profile_output_must_exist() {
        let gen = ScriptGenerator::new(vec![], vec!["true".into()]);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("profiles/development/Development_com.example.app.mobileprovision");

        let err = gen
            .generate_profile(
                CredentialType::Development,
                Platform::Ios,
                "com.example.app",
                "CERT1",
                false,
                &out,
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::GeneratorOutputMissing { .. }));
    }

    #[test]
    fn test_certificate_generation_picks_up_new_pair() {
        let dir = tempfile::tempdir().unwrap();
        let certs = dir.path().join("certs/development");
        std::fs::create_dir_all(&certs).unwrap();
        std::fs::write(certs.join("OLD.cer"), b"old").unwrap();
        std::fs::write(certs.join("OLD.p12"), b"old").unwrap();

        // The "generator" is a shell snippet writing a fresh pair.
        let script = format!(
            "echo cert > '{0}/NEW.cer' && echo key > '{0}/NEW.p12'",
            certs.display()
        );
        let gen = ScriptGenerator::new(vec!["sh".into(), "-c".into(), script], vec![]);

        let bundle = gen
            .generate_certificate(CredentialType::Development, Platform::Ios, dir.path())
            .unwrap();
        assert_eq!(bundle.certificate_id, "NEW");
    }
}
