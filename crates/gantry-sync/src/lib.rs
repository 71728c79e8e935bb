//! Credential synchronization engine
//!
//! Orchestrates one run against the shared medium and the remote authority:
//! resolve a certificate, resolve a profile per app identifier, verify them
//! remotely, and commit exactly what changed. Destructive reconciliation
//! lives here too.

pub mod drift;
pub mod error;
pub mod generator;
pub mod installer;
pub mod nuke;
pub mod output;
pub mod policy;
pub mod runner;

pub use error::{Result, SyncError};
pub use generator::{Generator, ScriptGenerator};
pub use installer::{Installer, KeychainInstaller};
pub use nuke::{NukePlan, NukeRunner, NukeSummary};
pub use output::ResolvedProfile;
pub use policy::SyncPolicy;
pub use runner::{Runner, SyncReport};
