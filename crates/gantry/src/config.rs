//! CLI configuration file
//!
//! One YAML file per project at `.gantry/config.yaml` describing the shared
//! medium, the App Store Connect key, and the defaults a sync run uses.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use gantry_core::Platform;
use gantry_portal::ConnectApiKey;
use gantry_storage::StorageConfig;

/// Default location relative to the project root
pub const DEFAULT_CONFIG_PATH: &str = ".gantry/config.yaml";

/// Project configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GantryConfig {
    /// Shared medium holding the encrypted credentials
    pub storage: StorageConfig,

    /// How stored files are encrypted
    #[serde(default)]
    pub encryption: EncryptionConfig,

    /// App Store Connect API key
    pub connect: ConnectApiKey,

    /// App identifiers synced by default
    #[serde(default)]
    pub app_identifiers: Vec<String>,

    /// Default target platform
    #[serde(default = "default_platform")]
    pub platform: Platform,

    /// Commands invoked to create new credentials
    #[serde(default)]
    pub generator: GeneratorConfig,
}

/// Encryption variant for stored files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionConfig {
    /// AES-256-CBC via openssl, keyed by a shared password
    #[default]
    OpensslPassword,
    /// Stored as-is; the medium itself is access-controlled
    None,
}

/// Generator subprocess configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Command creating a certificate+key pair, program first
    #[serde(default)]
    pub certificate_command: Vec<String>,

    /// Command creating a provisioning profile, program first
    #[serde(default)]
    pub profile_command: Vec<String>,
}

fn default_platform() -> Platform {
    Platform::Ios
}

impl GantryConfig {
    /// Load from a YAML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read configuration at {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Invalid configuration at {}", path.display()))?;
        Ok(config)
    }

    /// Write to a YAML file, creating parent directories
    pub fn save(&self, path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)
            .with_context(|| format!("Cannot write configuration to {}", path.display()))?;
        Ok(self.clone())
    }
}

/// Default configuration path
pub fn default_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG_YAML: &str = r#"
storage:
  kind: git
  url: git@example.com:org/certificates.git
  branch: main
connect:
  key_id: ABC123DEFG
  issuer_id: 12345678-aaaa-bbbb-cccc-0123456789ab
  key: /keys/AuthKey_ABC123DEFG.p8
app_identifiers:
  - com.example.app
platform: ios
"#;

    #[test]
    fn test_load_minimal_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, CONFIG_YAML).unwrap();

        let config = GantryConfig::load(&path).unwrap();
        assert_eq!(config.connect.key_id, "ABC123DEFG");
        assert_eq!(config.app_identifiers, vec!["com.example.app"]);
        assert_eq!(config.platform, Platform::Ios);
        // Encryption defaults to the password backend.
        assert_eq!(config.encryption, EncryptionConfig::OpensslPassword);
        assert!(config.generator.certificate_command.is_empty());
    }

    #[test]
    fn test_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.yaml");

        let config = GantryConfig {
            storage: StorageConfig::S3 {
                bucket: "certs".into(),
                prefix: "team".into(),
                region: "eu-west-1".into(),
            },
            encryption: EncryptionConfig::None,
            connect: ConnectApiKey {
                key_id: "KEY".into(),
                issuer_id: "ISSUER".into(),
                key: "/keys/AuthKey_KEY.p8".into(),
            },
            app_identifiers: vec!["com.example.app".into()],
            platform: Platform::Macos,
            generator: GeneratorConfig::default(),
        };
        config.save(&path).unwrap();

        let loaded = GantryConfig::load(&path).unwrap();
        assert_eq!(loaded.encryption, EncryptionConfig::None);
        assert_eq!(loaded.platform, Platform::Macos);
        match loaded.storage {
            StorageConfig::S3 { bucket, .. } => assert_eq!(bucket, "certs"),
            other => panic!("unexpected storage: {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_a_clear_error() {
        let err = GantryConfig::load(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert!(err.to_string().contains("Cannot read configuration"));
    }
}
