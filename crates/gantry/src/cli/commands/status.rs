//! Status command - inspect the shared medium without changing anything

use std::path::PathBuf;

use chrono::Utc;
use clap::Args;
use console::style;
use serde::Serialize;

use gantry_core::layout::{find_certificate_bundles, find_profiles};
use gantry_core::{CredentialType, ProfilePayload};
use gantry_crypto::{EncryptionBackend, OpensslEncryption};
use gantry_storage::WorkingCopy;

use crate::cli::{Cli, OutputFormat};
use crate::config::GantryConfig;

/// Show stored credential state
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Configuration file
    #[arg(short, long, default_value = crate::config::DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

#[derive(Debug, Serialize)]
struct TypeStatus {
    cred_type: String,
    certificates: Vec<String>,
    profiles: Vec<ProfileStatus>,
}

#[derive(Debug, Serialize)]
struct ProfileStatus {
    file: String,
    name: String,
    uuid: String,
    expired: bool,
}

impl StatusCommand {
    pub async fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let config = GantryConfig::load(&self.config)?;
        let storage = super::build_storage(&config)?;

        let work = storage.download().await?;
        let result = self.report(cli, &config, storage.as_ref(), &work);
        work.clear()?;
        result
    }

    fn report(
        &self,
        cli: &Cli,
        config: &GantryConfig,
        storage: &dyn gantry_storage::StorageBackend,
        work: &WorkingCopy,
    ) -> anyhow::Result<()> {
        if let Some(store) = super::build_password_store(config, storage, cli.interactive()) {
            let password = store.resolve()?;
            EncryptionBackend::Openssl(OpensslEncryption::new(password)).decrypt_files(work.path())?;
        }

        let now = Utc::now();
        let mut statuses = Vec::new();
        for cred_type in CredentialType::ALL {
            let certificates: Vec<String> = find_certificate_bundles(work.path(), cred_type)
                .into_iter()
                .map(|b| b.certificate_id)
                .collect();
            let profiles: Vec<ProfileStatus> = find_profiles(work.path(), cred_type)
                .iter()
                .filter_map(|path| {
                    let payload = ProfilePayload::parse(path).ok()?;
                    Some(ProfileStatus {
                        file: path
                            .file_name()
                            .and_then(|n| n.to_str())
                            .unwrap_or_default()
                            .to_string(),
                        name: payload.name.clone(),
                        uuid: payload.uuid.clone(),
                        expired: payload.is_expired(now),
                    })
                })
                .collect();
            if !certificates.is_empty() || !profiles.is_empty() {
                statuses.push(TypeStatus {
                    cred_type: cred_type.to_string(),
                    certificates,
                    profiles,
                });
            }
        }

        if cli.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&statuses)?);
            return Ok(());
        }
        if cli.quiet {
            return Ok(());
        }

        println!();
        println!("{} {}", style("Storage:").bold(), storage.description());
        if statuses.is_empty() {
            println!("{}", style("No credentials stored yet").dim());
        }
        for status in &statuses {
            println!();
            println!("{}", style(&status.cred_type).cyan().bold());
            for certificate in &status.certificates {
                println!("  {} certificate {}", style("•").dim(), certificate);
            }
            for profile in &status.profiles {
                let marker = if profile.expired {
                    style("expired").red().to_string()
                } else {
                    style("valid").green().to_string()
                };
                println!(
                    "  {} profile {} ({}) [{marker}]",
                    style("•").dim(),
                    profile.name,
                    profile.uuid
                );
            }
        }
        println!();
        Ok(())
    }
}
