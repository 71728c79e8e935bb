//! Remote authority client for Gantry
//!
//! The remote authority (App Store Connect) is the source of truth for
//! certificate and profile validity. This crate provides the typed entities,
//! the `PortalClient` trait the engine consumes, an App Store Connect
//! implementation, and the per-run memoized `RemoteSnapshot`.

pub mod client;
pub mod connect;
pub mod error;
pub mod snapshot;
pub mod types;

pub use client::PortalClient;
pub use connect::{ConnectApiKey, ConnectClient};
pub use error::{PortalError, Result};
pub use snapshot::RemoteSnapshot;
pub use types::{
    certificate_kinds, profile_kind, BundleId, Certificate, Device, Profile,
};
