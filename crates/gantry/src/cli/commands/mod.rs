//! CLI commands

mod init;
mod nuke;
mod status;
mod sync;

pub use init::InitCommand;
pub use nuke::NukeCommand;
pub use status::StatusCommand;
pub use sync::SyncCommand;

use crate::config::{EncryptionConfig, GantryConfig};
use gantry_crypto::PasswordStore;
use gantry_storage::{StorageBackend, StorageRegistry};

/// Build the storage backend a configuration selects
fn build_storage(config: &GantryConfig) -> anyhow::Result<Box<dyn StorageBackend>> {
    Ok(StorageRegistry::with_defaults().build(&config.storage)?)
}

/// Password store for the configured shared medium, `None` when encryption
/// is disabled
fn build_password_store(
    config: &GantryConfig,
    backend: &dyn StorageBackend,
    interactive: bool,
) -> Option<PasswordStore> {
    match config.encryption {
        EncryptionConfig::OpensslPassword => {
            Some(PasswordStore::new(backend.storage_key(), interactive))
        }
        EncryptionConfig::None => None,
    }
}
