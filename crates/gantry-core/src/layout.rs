//! Shared-medium file layout
//!
//! The repository stores `certs/<type>/<certificateId>.{cer,p12}` and
//! `profiles/<type>/<Prefix>_<appIdentifier>[_<platform>].<ext>`. All paths
//! are relative to the working directory root.

use std::path::{Path, PathBuf};

use crate::types::{CertificateBundle, CredentialType, Platform};

/// File extensions holding secret or credential material
///
/// Only files with these extensions are transformed by the encryption
/// backend.
pub const CREDENTIAL_EXTENSIONS: [&str; 4] = ["cer", "p12", "mobileprovision", "provisionprofile"];

/// Directory holding certificates of the given type
pub fn certs_dir(cred_type: CredentialType) -> PathBuf {
    Path::new("certs").join(cred_type.to_string())
}

/// Directory holding profiles of the given type
pub fn profiles_dir(cred_type: CredentialType) -> PathBuf {
    Path::new("profiles").join(cred_type.to_string())
}

/// Relative path of a stored certificate file
pub fn cert_path(cred_type: CredentialType, certificate_id: &str) -> PathBuf {
    certs_dir(cred_type).join(format!("{certificate_id}.cer"))
}

/// Relative path of a stored private key file
pub fn key_path(cred_type: CredentialType, certificate_id: &str) -> PathBuf {
    certs_dir(cred_type).join(format!("{certificate_id}.p12"))
}

/// File name a profile is stored under
///
/// The platform suffix is only added for non-iOS platforms, matching the
/// historical single-platform layout.
pub fn profile_filename(
    cred_type: CredentialType,
    app_identifier: &str,
    platform: Platform,
) -> Option<String> {
    let prefix = cred_type.profile_prefix()?;
    let name = if platform == Platform::Ios {
        format!("{prefix}_{app_identifier}")
    } else {
        format!("{prefix}_{app_identifier}_{platform}")
    };
    Some(format!("{name}.{}", platform.profile_extension()))
}

/// Relative path of a stored provisioning profile
pub fn profile_path(
    cred_type: CredentialType,
    app_identifier: &str,
    platform: Platform,
) -> Option<PathBuf> {
    let filename = profile_filename(cred_type, app_identifier, platform)?;
    Some(profiles_dir(cred_type).join(filename))
}

/// Whether a path carries credential material
pub fn is_credential_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| CREDENTIAL_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Find complete certificate+key pairs of the given type in a working copy
///
/// A `.cer` with no sibling `.p12` is skipped; the pair is unusable without
/// its private key.
pub fn find_certificate_bundles(
    working_dir: &Path,
    cred_type: CredentialType,
) -> Vec<CertificateBundle> {
    let dir = working_dir.join(certs_dir(cred_type));
    let mut bundles = Vec::new();

    for entry in walkdir::WalkDir::new(&dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("cer") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let p12 = path.with_extension("p12");
        if !p12.is_file() {
            tracing::warn!(certificate = stem, "Certificate has no private key, skipping");
            continue;
        }
        bundles.push(CertificateBundle {
            certificate_id: stem.to_string(),
            certificate_path: path.to_path_buf(),
            private_key_path: p12,
        });
    }

    bundles.sort_by(|a, b| a.certificate_id.cmp(&b.certificate_id));
    bundles
}

/// Enumerate stored profile files of the given type in a working copy
pub fn find_profiles(working_dir: &Path, cred_type: CredentialType) -> Vec<PathBuf> {
    let dir = working_dir.join(profiles_dir(cred_type));
    let mut profiles: Vec<PathBuf> = walkdir::WalkDir::new(&dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("mobileprovision") | Some("provisionprofile")
            )
        })
        .collect();
    profiles.sort();
    profiles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cert_paths() {
        assert_eq!(
            cert_path(CredentialType::Development, "CERT1"),
            PathBuf::from("certs/development/CERT1.cer")
        );
        assert_eq!(
            key_path(CredentialType::AppStore, "ABC123"),
            PathBuf::from("certs/appstore/ABC123.p12")
        );
    }

    #[test]
    fn test_profile_path_ios_has_no_platform_suffix() {
        let path = profile_path(CredentialType::Development, "com.example.app", Platform::Ios)
            .unwrap();
        assert_eq!(
            path,
            PathBuf::from("profiles/development/Development_com.example.app.mobileprovision")
        );
    }

    #[test]
    fn test_profile_path_other_platforms() {
        let path =
            profile_path(CredentialType::AppStore, "com.example.app", Platform::Tvos).unwrap();
        assert_eq!(
            path,
            PathBuf::from("profiles/appstore/AppStore_com.example.app_tvos.mobileprovision")
        );

        let mac = profile_path(CredentialType::DeveloperId, "com.example.app", Platform::Macos)
            .unwrap();
        assert_eq!(
            mac,
            PathBuf::from("profiles/developer_id/DeveloperID_com.example.app_macos.provisionprofile")
        );
    }

    #[test]
    fn test_installer_types_have_no_profile_path() {
        assert!(profile_path(
            CredentialType::MacInstallerDistribution,
            "com.example.app",
            Platform::Macos
        )
        .is_none());
    }

    #[test]
    fn test_find_certificate_bundles_requires_pair() {
        let dir = tempfile::tempdir().unwrap();
        let certs = dir.path().join("certs/development");
        std::fs::create_dir_all(&certs).unwrap();
        std::fs::write(certs.join("A.cer"), b"cert").unwrap();
        std::fs::write(certs.join("A.p12"), b"key").unwrap();
        std::fs::write(certs.join("B.cer"), b"orphan").unwrap();

        let bundles = find_certificate_bundles(dir.path(), CredentialType::Development);
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].certificate_id, "A");
        assert!(bundles[0].is_complete());
    }

    #[test]
    fn test_is_credential_file() {
        assert!(is_credential_file(Path::new("certs/development/X.p12")));
        assert!(is_credential_file(Path::new("p.mobileprovision")));
        assert!(!is_credential_file(Path::new("README.md")));
    }
}
