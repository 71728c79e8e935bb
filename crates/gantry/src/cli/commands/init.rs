//! Init command - write a fresh project configuration

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use console::style;

use gantry_portal::ConnectApiKey;
use gantry_storage::StorageConfig;

use crate::cli::{Cli, OutputFormat};
use crate::config::{EncryptionConfig, GantryConfig, GeneratorConfig};

/// Initialize a gantry configuration
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Storage type
    #[arg(short, long, default_value = "git")]
    pub storage: StorageTypeArg,

    /// Git repository URL
    #[arg(long, required_if_eq("storage", "git"))]
    pub git_url: Option<String>,

    /// Git branch
    #[arg(long, default_value = "main")]
    pub branch: String,

    /// S3 bucket name
    #[arg(long, required_if_eq("storage", "s3"))]
    pub bucket: Option<String>,

    /// S3 prefix
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// AWS region
    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// GitLab API v4 base URL
    #[arg(long, default_value = "https://gitlab.com/api/v4")]
    pub api_v4_url: String,

    /// GitLab project ID or group/project path
    #[arg(long, required_if_eq("storage", "gitlab-secure-files"))]
    pub project_id: Option<String>,

    /// App Store Connect key ID
    #[arg(long)]
    pub key_id: String,

    /// App Store Connect issuer ID
    #[arg(long)]
    pub issuer_id: String,

    /// Path to the App Store Connect .p8 key
    #[arg(long)]
    pub key_path: PathBuf,

    /// App identifiers to sync by default
    #[arg(short, long = "app-identifier")]
    pub app_identifiers: Vec<String>,

    /// Store files unencrypted (the medium itself must be access-controlled)
    #[arg(long)]
    pub no_encryption: bool,

    /// Output path for the configuration
    #[arg(short, long, default_value = crate::config::DEFAULT_CONFIG_PATH)]
    pub output: PathBuf,
}

/// Storage type argument
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StorageTypeArg {
    /// Git repository
    Git,
    /// AWS S3
    S3,
    /// GitLab CI secure files
    GitlabSecureFiles,
}

impl InitCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        if self.output.exists() {
            anyhow::bail!(
                "Configuration already exists at {}; remove it first",
                self.output.display()
            );
        }

        let storage = match self.storage {
            StorageTypeArg::Git => {
                let url = self
                    .git_url
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("Git URL required for git storage"))?;
                StorageConfig::Git {
                    url: url.clone(),
                    branch: self.branch.clone(),
                    shallow_clone: false,
                    git_full_name: None,
                    git_user_email: None,
                }
            }
            StorageTypeArg::S3 => {
                let bucket = self
                    .bucket
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("Bucket required for S3 storage"))?;
                StorageConfig::S3 {
                    bucket: bucket.clone(),
                    prefix: self.prefix.clone(),
                    region: self.region.clone(),
                }
            }
            StorageTypeArg::GitlabSecureFiles => {
                let project_id = self.project_id.as_ref().ok_or_else(|| {
                    anyhow::anyhow!("Project ID required for GitLab secure files storage")
                })?;
                StorageConfig::GitlabSecureFiles {
                    api_v4_url: self.api_v4_url.clone(),
                    project_id: project_id.clone(),
                }
            }
        };

        let config = GantryConfig {
            storage,
            encryption: if self.no_encryption {
                EncryptionConfig::None
            } else {
                EncryptionConfig::OpensslPassword
            },
            connect: ConnectApiKey {
                key_id: self.key_id.clone(),
                issuer_id: self.issuer_id.clone(),
                key: self.key_path.display().to_string(),
            },
            app_identifiers: self.app_identifiers.clone(),
            platform: gantry_core::Platform::Ios,
            generator: GeneratorConfig::default(),
        };
        config.save(&self.output)?;

        if !cli.quiet && cli.format == OutputFormat::Text {
            println!();
            println!(
                "{} Configuration written to {}",
                style("✓").green(),
                style(self.output.display()).cyan()
            );
            if !self.no_encryption {
                println!(
                    "  Set {} (or answer the prompt on first sync) to choose the \
                     storage passphrase",
                    style(gantry_crypto::password::PASSWORD_ENV_VAR).bold()
                );
            }
            println!("  Run {} to fetch credentials", style("gantry sync").bold());
            println!();
        }
        Ok(())
    }
}
