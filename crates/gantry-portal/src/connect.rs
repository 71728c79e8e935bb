//! App Store Connect API client
//!
//! Authenticates with an ES256-signed JWT (cached until shortly before
//! expiry) and pages through list endpoints following `links.next`.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use gantry_core::Platform;

use crate::client::PortalClient;
use crate::error::{PortalError, Result};
use crate::types::{device_platform, BundleId, Certificate, Device, Profile};

const API_BASE_URL: &str = "https://api.appstoreconnect.apple.com/v1";

/// API key material for App Store Connect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectApiKey {
    /// Key ID (the `kid` JWT header)
    pub key_id: String,

    /// Issuer ID
    pub issuer_id: String,

    /// The `.p8` private key: either a file path or the PEM content itself
    pub key: String,
}

/// JWT claims for App Store Connect API
#[derive(Debug, Serialize)]
struct Claims {
    iss: String,
    iat: i64,
    exp: i64,
    aud: String,
}

/// App Store Connect implementation of [`PortalClient`]
pub struct ConnectClient {
    api_key: ConnectApiKey,
    client: Client,
    base_url: String,
    // (token, expiry); refreshed when within five minutes of expiry
    token: Mutex<Option<(String, DateTime<Utc>)>>,
}

impl ConnectClient {
    /// Create a client for the production API
    pub fn new(api_key: ConnectApiKey) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url: API_BASE_URL.to_string(),
            token: Mutex::new(None),
        }
    }

    /// Point the client at a different base URL (tests, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn generate_jwt(&self) -> Result<String> {
        let mut cached = self
            .token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some((token, expires)) = cached.as_ref() {
            if Utc::now() < *expires - Duration::minutes(5) {
                return Ok(token.clone());
            }
        }

        let now = Utc::now();
        let exp = now + Duration::minutes(20);
        let claims = Claims {
            iss: self.api_key.issuer_id.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            aud: "appstoreconnect-v1".to_string(),
        };

        let key_content = if Path::new(&self.api_key.key).exists() {
            std::fs::read_to_string(&self.api_key.key)?
        } else {
            self.api_key.key.clone()
        };

        let encoding_key = EncodingKey::from_ec_pem(key_content.as_bytes())
            .map_err(|e| PortalError::Auth(format!("Invalid API key: {e}")))?;

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.api_key.key_id.clone());

        let token = encode(&header, &claims, &encoding_key)?;
        *cached = Some((token.clone(), exp));
        Ok(token)
    }

    async fn get_paged<A: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(String, String)],
    ) -> Result<Vec<ApiResource<A>>> {
        let mut url = format!("{}{}", self.base_url, endpoint);
        let mut first = true;
        let mut resources = Vec::new();

        loop {
            let token = self.generate_jwt()?;
            let mut request = self
                .client
                .get(&url)
                .header("Authorization", format!("Bearer {token}"));
            if first {
                request = request.query(query).query(&[("limit", "200")]);
            }

            let response = request.send().await?;
            let status = response.status();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(PortalError::Auth(response.text().await.unwrap_or_default()));
            }
            if !status.is_success() {
                return Err(PortalError::Api {
                    status: status.as_u16(),
                    message: response.text().await.unwrap_or_default(),
                });
            }

            let page: ApiPage<A> = response
                .json()
                .await
                .map_err(|e| PortalError::Decode(e.to_string()))?;

            resources.extend(page.data);
            match page.links.and_then(|l| l.next) {
                Some(next) => {
                    debug!(endpoint, "Following pagination link");
                    url = next;
                    first = false;
                }
                None => break,
            }
        }

        Ok(resources)
    }

    async fn delete(&self, endpoint: &str) -> Result<()> {
        let token = self.generate_jwt()?;
        let response = self
            .client
            .delete(format!("{}{}", self.base_url, endpoint))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PortalError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ApiPage<A> {
    data: Vec<ApiResource<A>>,
    links: Option<PageLinks>,
}

#[derive(Debug, Deserialize)]
struct PageLinks {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResource<A> {
    id: String,
    attributes: A,
    relationships: Option<Relationships>,
}

#[derive(Debug, Deserialize)]
struct Relationships {
    devices: Option<Relationship>,
    certificates: Option<Relationship>,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    data: Option<Vec<RelatedResource>>,
}

#[derive(Debug, Deserialize)]
struct RelatedResource {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CertificateAttributes {
    name: Option<String>,
    certificate_type: Option<String>,
    expiration_date: Option<String>,
    certificate_content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileAttributes {
    name: Option<String>,
    uuid: Option<String>,
    profile_type: Option<String>,
    profile_state: Option<String>,
    expiration_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceAttributes {
    name: Option<String>,
    udid: Option<String>,
    platform: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BundleIdAttributes {
    name: Option<String>,
    identifier: Option<String>,
}

fn parse_date(value: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = value?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(e) => {
            warn!(raw, error = %e, "Unparseable expiration date from API");
            None
        }
    }
}

fn related_ids(relationship: Option<&Relationship>) -> Option<Vec<String>> {
    relationship
        .and_then(|r| r.data.as_ref())
        .map(|resources| resources.iter().map(|r| r.id.clone()).collect())
}

#[async_trait]
impl PortalClient for ConnectClient {
    async fn certificates(&self, kinds: &[&str]) -> Result<Vec<Certificate>> {
        let query = vec![(
            "filter[certificateType]".to_string(),
            kinds.join(","),
        )];
        let resources: Vec<ApiResource<CertificateAttributes>> =
            self.get_paged("/certificates", &query).await?;

        Ok(resources
            .into_iter()
            .map(|r| Certificate {
                id: r.id,
                name: r.attributes.name.unwrap_or_default(),
                certificate_type: r.attributes.certificate_type.unwrap_or_default(),
                expiration: parse_date(r.attributes.expiration_date.as_deref()),
                content: r.attributes.certificate_content,
            })
            .collect())
    }

    async fn profiles(
        &self,
        kind: &str,
        include_devices: bool,
        include_certificates: bool,
    ) -> Result<Vec<Profile>> {
        let mut query = vec![("filter[profileType]".to_string(), kind.to_string())];
        let mut includes = Vec::new();
        if include_devices {
            includes.push("devices");
        }
        if include_certificates {
            includes.push("certificates");
        }
        if !includes.is_empty() {
            query.push(("include".to_string(), includes.join(",")));
        }

        let resources: Vec<ApiResource<ProfileAttributes>> =
            self.get_paged("/profiles", &query).await?;

        Ok(resources
            .into_iter()
            .map(|r| Profile {
                id: r.id,
                uuid: r.attributes.uuid.unwrap_or_default(),
                name: r.attributes.name.unwrap_or_default(),
                profile_type: r.attributes.profile_type.unwrap_or_default(),
                state: r.attributes.profile_state.unwrap_or_default(),
                expiration: parse_date(r.attributes.expiration_date.as_deref()),
                device_ids: related_ids(
                    r.relationships.as_ref().and_then(|rel| rel.devices.as_ref()),
                ),
                certificate_ids: related_ids(
                    r.relationships
                        .as_ref()
                        .and_then(|rel| rel.certificates.as_ref()),
                ),
            })
            .collect())
    }

    async fn devices(&self, platform: Platform) -> Result<Vec<Device>> {
        let query = vec![
            (
                "filter[platform]".to_string(),
                device_platform(platform).to_string(),
            ),
            ("filter[status]".to_string(), "ENABLED".to_string()),
        ];
        let resources: Vec<ApiResource<DeviceAttributes>> =
            self.get_paged("/devices", &query).await?;

        Ok(resources
            .into_iter()
            .map(|r| Device {
                id: r.id,
                udid: r.attributes.udid.unwrap_or_default(),
                name: r.attributes.name.unwrap_or_default(),
                platform: r.attributes.platform.unwrap_or_default(),
                status: r.attributes.status.unwrap_or_default(),
            })
            .collect())
    }

    async fn bundle_ids(&self, identifiers: &[String]) -> Result<Vec<BundleId>> {
        let query = vec![("filter[identifier]".to_string(), identifiers.join(","))];
        let resources: Vec<ApiResource<BundleIdAttributes>> =
            self.get_paged("/bundleIds", &query).await?;

        Ok(resources
            .into_iter()
            .map(|r| BundleId {
                id: r.id,
                identifier: r.attributes.identifier.unwrap_or_default(),
                name: r.attributes.name.unwrap_or_default(),
            })
            .collect())
    }

    async fn delete_profile(&self, id: &str) -> Result<()> {
        self.delete(&format!("/profiles/{id}")).await
    }

    async fn revoke_certificate(&self, id: &str) -> Result<()> {
        self.delete(&format!("/certificates/{id}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        let parsed = parse_date(Some("2027-03-25T22:33:40.000+00:00")).unwrap();
        assert_eq!(parsed.timezone(), Utc);
        assert!(parse_date(Some("not a date")).is_none());
        assert!(parse_date(None).is_none());
    }

    #[test]
    fn test_profile_page_decoding() {
        let body = r#"{
            "data": [{
                "type": "profiles",
                "id": "PROF1",
                "attributes": {
                    "name": "Development com.example.app",
                    "uuid": "98264c6b",
                    "profileType": "IOS_APP_DEVELOPMENT",
                    "profileState": "ACTIVE",
                    "expirationDate": "2027-03-25T22:33:40.000+00:00"
                },
                "relationships": {
                    "devices": { "data": [{"type": "devices", "id": "DEV1"}] },
                    "certificates": { "data": [{"type": "certificates", "id": "CERT1"}] }
                }
            }],
            "links": {}
        }"#;

        let page: ApiPage<ProfileAttributes> = serde_json::from_str(body).unwrap();
        assert_eq!(page.data.len(), 1);
        let resource = &page.data[0];
        assert_eq!(resource.id, "PROF1");
        assert_eq!(resource.attributes.profile_state.as_deref(), Some("ACTIVE"));
        assert_eq!(
            related_ids(resource.relationships.as_ref().unwrap().devices.as_ref()),
            Some(vec!["DEV1".to_string()])
        );
    }

    #[test]
    fn test_certificate_page_decoding() {
        let body = r#"{
            "data": [{
                "type": "certificates",
                "id": "CERT1",
                "attributes": {
                    "name": "Apple Development",
                    "certificateType": "DEVELOPMENT",
                    "expirationDate": "2026-01-01T00:00:00+00:00"
                }
            }]
        }"#;

        let page: ApiPage<CertificateAttributes> = serde_json::from_str(body).unwrap();
        assert_eq!(page.data[0].attributes.certificate_type.as_deref(), Some("DEVELOPMENT"));
        assert!(page.links.is_none());
    }
}
