//! Core domain types for Gantry credential synchronization
//!
//! Shared vocabulary for the storage, crypto, portal, and sync crates:
//! credential types, the shared-medium file layout, provisioning profile
//! parsing, and the per-run change set.

pub mod changeset;
pub mod error;
pub mod layout;
pub mod profile;
pub mod types;

pub use changeset::ChangeSet;
pub use error::{CoreError, Result};
pub use profile::ProfilePayload;
pub use types::{CertificateBundle, CredentialType, Platform};
