//! CLI definition and command handling

pub mod commands;

use clap::{Parser, Subcommand};

use commands::{InitCommand, NukeCommand, StatusCommand, SyncCommand};

/// Gantry - code signing credential synchronization
#[derive(Debug, Parser)]
#[command(name = "gantry")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Never prompt; fail instead of asking
    #[arg(long, global = true)]
    pub non_interactive: bool,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Initialize a gantry configuration
    Init(InitCommand),

    /// Sync certificates and provisioning profiles
    Sync(SyncCommand),

    /// Show stored credential state
    Status(StatusCommand),

    /// Delete certificates and profiles everywhere
    Nuke(NukeCommand),
}

impl Cli {
    /// Whether prompts are permitted for this invocation
    pub fn interactive(&self) -> bool {
        !self.non_interactive && console::user_attended()
    }

    /// Execute the CLI command
    pub fn execute(self) -> anyhow::Result<()> {
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        let runtime = tokio::runtime::Runtime::new()?;
        match self.command {
            Commands::Init(ref cmd) => cmd.execute(&self),
            Commands::Sync(ref cmd) => runtime.block_on(cmd.execute(&self)),
            Commands::Status(ref cmd) => runtime.block_on(cmd.execute(&self)),
            Commands::Nuke(ref cmd) => runtime.block_on(cmd.execute(&self)),
        }
    }
}
