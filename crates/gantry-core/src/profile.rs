//! Provisioning profile payload parsing
//!
//! Profiles on disk are CMS envelopes with an XML plist payload embedded in
//! the signed blob. The parser locates the plist boundaries in the raw bytes
//! and decodes the keys the sync engine needs; signature verification is the
//! remote authority's job, not ours.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

const PLIST_START: &[u8] = b"<?xml";
const PLIST_END: &[u8] = b"</plist>";

/// Decoded fields of a provisioning profile payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilePayload {
    /// Profile UUID, the identity the remote authority recognizes
    pub uuid: String,

    /// Display name of the profile
    pub name: String,

    /// Team identifier the profile belongs to
    pub team_id: Option<String>,

    /// Expiration timestamp
    pub expiration: Option<DateTime<Utc>>,

    /// UDIDs of provisioned devices; empty for non device-scoped profiles
    pub provisioned_devices: Vec<String>,
}

impl ProfilePayload {
    /// Parse the payload embedded in a profile file
    pub fn parse(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let plist_bytes = extract_plist(&data)
            .ok_or_else(|| CoreError::MissingPayload(path.to_path_buf()))?;

        let value = plist::Value::from_reader_xml(std::io::Cursor::new(plist_bytes))?;
        let dict = value.as_dictionary().ok_or(CoreError::MissingKey {
            path: path.to_path_buf(),
            key: "(root dictionary)",
        })?;

        let string_key = |key: &'static str| -> Result<String> {
            dict.get(key)
                .and_then(|v| v.as_string())
                .map(str::to_string)
                .ok_or(CoreError::MissingKey {
                    path: path.to_path_buf(),
                    key,
                })
        };

        let uuid = string_key("UUID")?;
        let name = string_key("Name")?;

        let team_id = dict
            .get("TeamIdentifier")
            .and_then(|v| v.as_array())
            .and_then(|a| a.first())
            .and_then(|v| v.as_string())
            .map(str::to_string);

        let expiration = dict
            .get("ExpirationDate")
            .and_then(|v| v.as_date())
            .map(|d| DateTime::<Utc>::from(std::time::SystemTime::from(d)));

        let provisioned_devices = dict
            .get("ProvisionedDevices")
            .and_then(|v| v.as_array())
            .map(|devices| {
                devices
                    .iter()
                    .filter_map(|v| v.as_string())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            uuid,
            name,
            team_id,
            expiration,
            provisioned_devices,
        })
    }

    /// Whether the profile's own expiration has passed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.map(|exp| exp < now).unwrap_or(false)
    }
}

/// Locate the XML plist inside a CMS envelope
fn extract_plist(data: &[u8]) -> Option<&[u8]> {
    let start = find_subslice(data, PLIST_START)?;
    let end = find_subslice(&data[start..], PLIST_END)? + start + PLIST_END.len();
    Some(&data[start..end])
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
