//! Nuke command - delete credentials everywhere they live

use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::Args;
use console::style;
use dialoguer::{Confirm, MultiSelect};

use gantry_core::CredentialType;
use gantry_crypto::{EncryptionBackend, OpensslEncryption};
use gantry_portal::ConnectClient;
use gantry_sync::{NukePlan, NukeRunner};

use crate::cli::{Cli, OutputFormat};
use crate::config::GantryConfig;

/// Delete certificates and profiles everywhere
#[derive(Debug, Args)]
pub struct NukeCommand {
    /// Credential type to delete (distribution types cover appstore, adhoc,
    /// and developer_id together)
    #[arg(short = 't', long, default_value = "development")]
    pub cred_type: CredentialType,

    /// Leave remote certificates unrevoked, only remove stored copies
    #[arg(long)]
    pub safe_remove: bool,

    /// Skip confirmation and narrowing prompts
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Configuration file
    #[arg(short, long, default_value = crate::config::DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

impl NukeCommand {
    pub async fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let config = GantryConfig::load(&self.config)?;
        let storage = super::build_storage(&config)?;
        let password_store =
            super::build_password_store(&config, storage.as_ref(), cli.interactive());

        let work = storage.download().await?;
        if let Some(store) = &password_store {
            let password = store.resolve()?;
            EncryptionBackend::Openssl(OpensslEncryption::new(password))
                .decrypt_files(work.path())?;
        }

        let runner = NukeRunner::new(
            Box::new(ConnectClient::new(config.connect.clone())),
            storage,
        );

        let result = self.run(cli, &runner, &work).await;
        work.clear()?;
        result
    }

    async fn run(
        &self,
        cli: &Cli,
        runner: &NukeRunner,
        work: &gantry_storage::WorkingCopy,
    ) -> anyhow::Result<()> {
        let mut plan = runner.plan(work, self.cred_type).await?;

        if plan.is_empty() {
            if !cli.quiet && cli.format == OutputFormat::Text {
                println!("{} Nothing to delete", style("✓").green());
            }
            return Ok(());
        }

        let interactive = cli.interactive() && !self.yes;
        if interactive && plan.certificates.len() > 1 {
            plan = self.narrow_interactively(plan, work)?;
            if plan.is_empty() {
                println!("{}", style("Nothing selected, aborting").dim());
                return Ok(());
            }
        }

        self.print_plan(cli, &plan);

        if interactive {
            let confirmed = Confirm::new()
                .with_prompt("Delete all of the above? This cannot be undone")
                .default(false)
                .interact()?;
            if !confirmed {
                println!("{}", style("Aborted").dim());
                return Ok(());
            }
        }

        let summary = runner.execute(work, plan, self.safe_remove).await?;
        if !cli.quiet && cli.format == OutputFormat::Text {
            println!(
                "{} Deleted {} profile(s), revoked {} certificate(s), removed {} file(s)",
                style("✓").green(),
                summary.profiles_deleted,
                summary.certificates_revoked,
                summary.files_removed
            );
        }
        Ok(())
    }

    fn narrow_interactively(
        &self,
        plan: NukePlan,
        work: &gantry_storage::WorkingCopy,
    ) -> anyhow::Result<NukePlan> {
        let labels: Vec<String> = plan
            .certificates
            .iter()
            .map(|c| format!("{} ({})", c.name, c.id))
            .collect();
        let chosen = MultiSelect::new()
            .with_prompt("Multiple certificates found; select the ones to delete")
            .items(&labels)
            .interact()?;

        let selected: BTreeSet<String> = chosen
            .into_iter()
            .map(|index| plan.certificates[index].id.clone())
            .collect();
        Ok(plan.narrow(&selected, work))
    }

    fn print_plan(&self, cli: &Cli, plan: &NukePlan) {
        if cli.quiet || cli.format != OutputFormat::Text {
            return;
        }
        println!();
        println!("{}", style("The following will be deleted:").bold());
        for certificate in &plan.certificates {
            println!(
                "  {} certificate {} ({})",
                style("•").red(),
                certificate.name,
                certificate.id
            );
        }
        for profile in &plan.profiles {
            println!("  {} profile {}", style("•").red(), profile.name);
        }
        for file in &plan.files {
            println!("  {} file {}", style("•").red(), file.display());
        }
        println!();
    }
}
