//! Sync command - resolve certificates and provisioning profiles

use std::path::PathBuf;

use clap::Args;
use console::style;

use gantry_core::{CredentialType, Platform};
use gantry_portal::{ConnectClient, RemoteSnapshot};
use gantry_sync::{output, KeychainInstaller, Runner, ScriptGenerator, SyncPolicy, SyncReport};

use crate::cli::{Cli, OutputFormat};
use crate::config::GantryConfig;

/// Sync certificates and provisioning profiles
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Credential type to sync
    #[arg(short = 't', long, default_value = "development")]
    pub cred_type: CredentialType,

    /// Target platform
    #[arg(short, long)]
    pub platform: Option<Platform>,

    /// App identifiers (defaults to the configured list)
    #[arg(short, long = "app-identifier")]
    pub app_identifiers: Vec<String>,

    /// Never create or modify anything
    #[arg(long)]
    pub readonly: bool,

    /// Regenerate profiles unconditionally
    #[arg(long)]
    pub force: bool,

    /// Regenerate when the remote device set changed
    #[arg(long)]
    pub force_for_new_devices: bool,

    /// Regenerate when the remote certificate set changed
    #[arg(long)]
    pub force_for_new_certificates: bool,

    /// Embed every valid development certificate in generated profiles
    #[arg(long)]
    pub include_all_certificates: bool,

    /// Configuration file
    #[arg(short, long, default_value = crate::config::DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

impl SyncCommand {
    pub async fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let config = GantryConfig::load(&self.config)?;
        let platform = self.platform.unwrap_or(config.platform);
        let app_identifiers = if self.app_identifiers.is_empty() {
            config.app_identifiers.clone()
        } else {
            self.app_identifiers.clone()
        };

        let policy = SyncPolicy::new(self.cred_type, platform)
            .app_identifiers(app_identifiers.clone())
            .readonly(self.readonly)
            .force(self.force)
            .force_for_new_devices(self.force_for_new_devices)
            .force_for_new_certificates(self.force_for_new_certificates)
            .include_all_certificates(self.include_all_certificates);

        let storage = super::build_storage(&config)?;
        let password_store = super::build_password_store(&config, storage.as_ref(), cli.interactive());
        let snapshot = RemoteSnapshot::new(
            Box::new(ConnectClient::new(config.connect.clone())),
            self.cred_type,
            platform,
            app_identifiers,
        );
        let generator = ScriptGenerator::new(
            config.generator.certificate_command.clone(),
            config.generator.profile_command.clone(),
        );

        if !cli.quiet && cli.format == OutputFormat::Text {
            println!();
            println!(
                "{} {} credentials for {}",
                style("Syncing").bold(),
                style(self.cred_type).cyan(),
                style(storage.description()).cyan()
            );
            println!();
        }

        let runner = Runner::new(
            policy,
            storage,
            snapshot,
            Box::new(generator),
            Box::new(KeychainInstaller::new()),
            password_store
                .map(|store| Box::new(store) as Box<dyn gantry_crypto::PasswordSource>),
        );
        let report = runner.run().await?;

        output::publish(&report.resolved, self.cred_type, platform);
        self.print_report(cli, &report)?;
        Ok(())
    }

    fn print_report(&self, cli: &Cli, report: &SyncReport) -> anyhow::Result<()> {
        if cli.format == OutputFormat::Json {
            let resolutions: Vec<serde_json::Value> = report
                .resolved
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "app_identifier": r.app_identifier,
                        "uuid": r.uuid,
                        "team_id": r.team_id,
                        "profile_name": r.name,
                        "profile_path": r.path,
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "resolved": resolutions,
                    "changed_files": report.changed_files,
                }))?
            );
            return Ok(());
        }

        if cli.quiet {
            return Ok(());
        }

        for resolution in &report.resolved {
            println!(
                "{} {} {} {}",
                style("✓").green(),
                style(&resolution.app_identifier).bold(),
                resolution.uuid,
                style(resolution.path.display()).dim()
            );
        }
        println!();
        if report.changed_files.is_empty() {
            println!("{}", style("All credentials were already in sync").dim());
        } else {
            println!(
                "{} file(s) updated in the shared storage",
                style(report.changed_files.len()).bold()
            );
        }
        println!();
        Ok(())
    }
}
