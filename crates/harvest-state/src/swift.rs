//! OpenStack Swift object store client
//!
//! Authenticates against Keystone v3 (password method, API key as password),
//! picks the public `object-store` endpoint from the token catalog and uploads
//! objects with plain `PUT` requests.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::error::StorageError;
use crate::record::BackupDescriptor;
use crate::storage_traits::{object_key, ObjectStore, StorageResult};

const USER_AGENT: &str = concat!("harvest-sink/", env!("CARGO_PKG_VERSION"));

/// Swift account configuration
#[derive(Debug, Clone)]
pub struct SwiftConfig {
    pub username: String,
    /// API key, sent as the Keystone password
    pub api_key: String,
    /// Keystone URL (e.g. "https://auth.cloud.example/v3")
    pub auth_url: String,
    /// Keystone user domain name
    pub domain: String,
    /// Container every object is written to
    pub container: String,
}

impl SwiftConfig {
    pub fn new(
        username: impl Into<String>,
        api_key: impl Into<String>,
        auth_url: impl Into<String>,
        domain: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            api_key: api_key.into(),
            auth_url: auth_url.into(),
            domain: domain.into(),
            container: container.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Token,
}

#[derive(Debug, Deserialize)]
struct Token {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Debug, Deserialize)]
struct Endpoint {
    interface: String,
    url: String,
}

/// Keystone token endpoint for an auth URL.
fn token_url(auth_url: &str) -> String {
    let base = auth_url.trim_end_matches('/');
    if base.ends_with("/auth/tokens") {
        base.to_string()
    } else {
        format!("{base}/auth/tokens")
    }
}

/// Public object-store endpoint from a token catalog.
fn object_store_endpoint(token: &Token) -> Option<String> {
    token
        .catalog
        .iter()
        .filter(|entry| entry.service_type == "object-store")
        .flat_map(|entry| entry.endpoints.iter())
        .find(|ep| ep.interface == "public")
        .map(|ep| ep.url.trim_end_matches('/').to_string())
}

/// Authenticated Swift client bound to one container.
pub struct SwiftObjectStore {
    http: reqwest::Client,
    storage_url: String,
    token: String,
    container: String,
}

impl SwiftObjectStore {
    /// Authenticate and resolve the storage URL.
    #[instrument(skip(config), fields(auth_url = %config.auth_url, container = %config.container))]
    pub async fn connect(config: &SwiftConfig) -> StorageResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| StorageError::Connection(format!("Failed to create HTTP client: {e}")))?;

        let body = serde_json::json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": config.username,
                            "domain": { "name": config.domain },
                            "password": config.api_key,
                        }
                    }
                }
            }
        });

        let response = http
            .post(token_url(&config.auth_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| StorageError::Connection(format!("Keystone request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(StorageError::Auth(format!(
                "Keystone returned {}",
                response.status()
            )));
        }

        let token = response
            .headers()
            .get("X-Subject-Token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| StorageError::Auth("missing X-Subject-Token header".to_string()))?;

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Auth(format!("unreadable token body: {e}")))?;

        let storage_url = object_store_endpoint(&parsed.token).ok_or_else(|| {
            StorageError::Auth("no public object-store endpoint in catalog".to_string())
        })?;

        info!(storage_url = %storage_url, "Swift authenticated");
        Ok(Self {
            http,
            storage_url,
            token,
            container: config.container.clone(),
        })
    }
}

/// Object URL with the container and every key segment percent-encoded.
fn object_url(storage_url: &str, container: &str, key: &str) -> StorageResult<Url> {
    let mut url = Url::parse(storage_url)
        .map_err(|e| StorageError::Connection(format!("bad storage URL {storage_url}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| StorageError::Connection(format!("storage URL {storage_url} has no path")))?
        .pop_if_empty()
        .push(container)
        .extend(key.split('/'));
    Ok(url)
}

#[async_trait]
impl ObjectStore for SwiftObjectStore {
    #[instrument(skip(self), fields(container = %self.container))]
    async fn upload_file(&self, path: &Path, agency_id: &str) -> StorageResult<BackupDescriptor> {
        let key = object_key(path, agency_id)?;
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| StorageError::io(path, e))?;
        let url = object_url(&self.storage_url, &self.container, &key)?;
        let descriptor = BackupDescriptor::for_bytes(url.as_str(), &data);

        debug!(key = %key, size = descriptor.size, "Uploading object");

        let response = self
            .http
            .put(url)
            .header("X-Auth-Token", &self.token)
            .body(data)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StorageError::Upload {
                path: path.to_path_buf(),
                reason: format!("Swift returned {}", response.status()),
            });
        }

        Ok(descriptor)
    }
}
