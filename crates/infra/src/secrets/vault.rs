//! Vault KV v2 secret resolver.
//!
//! Paths (mount defaults to `secret`):
//! - `GET /v1/<mount>/data/jenkins/<pipeline>` -> `webhook_url`, optional `webhook_token`
//! - `GET /v1/<mount>/data/jenkins` -> `username`, `api_token`
//!
//! Nothing is cached; every dispatch reads the current secret version.

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, instrument};

use super::{JenkinsCredentials, SecretError, SecretResolver, WebhookSecret};

const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";

#[derive(Clone)]
pub struct VaultSecretResolver {
    client: reqwest::Client,
    addr: String,
    token: String,
    mount: String,
}

impl std::fmt::Debug for VaultSecretResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSecretResolver")
            .field("addr", &self.addr)
            .field("mount", &self.mount)
            .finish_non_exhaustive()
    }
}

/// KV v2 read envelope: the secret lives under `data.data`.
#[derive(Debug, Deserialize)]
struct KvV2Response {
    data: KvV2Data,
}

#[derive(Debug, Deserialize)]
struct KvV2Data {
    data: Map<String, JsonValue>,
}

impl VaultSecretResolver {
    pub fn new(
        client: reqwest::Client,
        addr: impl Into<String>,
        token: impl Into<String>,
        mount: impl Into<String>,
    ) -> Self {
        Self {
            client,
            addr: addr.into().trim_end_matches('/').to_string(),
            token: token.into(),
            mount: mount.into().trim_matches('/').to_string(),
        }
    }

    /// `/v1/<mount>/data/<suffix...>`, each suffix segment percent-encoded.
    fn url_for(&self, suffix: &[&str]) -> Result<Url, SecretError> {
        let mut url = Url::parse(&self.addr)
            .map_err(|e| SecretError::Unreachable(format!("invalid Vault address {}: {e}", self.addr)))?;
        url.path_segments_mut()
            .map_err(|_| SecretError::Unreachable(format!("invalid Vault address {}", self.addr)))?
            .pop_if_empty()
            .push("v1")
            .extend(self.mount.split('/'))
            .push("data")
            .extend(suffix);
        Ok(url)
    }

    async fn read(&self, suffix: &[&str]) -> Result<(String, Map<String, JsonValue>), SecretError> {
        let path = format!("{}/data/{}", self.mount, suffix.join("/"));
        let url = self.url_for(suffix)?;

        let response = self
            .client
            .get(url)
            .header(VAULT_TOKEN_HEADER, &self.token)
            .send()
            .await
            .map_err(|e| SecretError::Unreachable(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SecretError::Rejected {
                path,
                status: status.as_u16(),
            });
        }

        let body: KvV2Response = response.json().await.map_err(|e| SecretError::Malformed {
            path: path.clone(),
            reason: e.without_url().to_string(),
        })?;

        debug!(path = %path, "read secret");
        Ok((path, body.data.data))
    }
}

fn required_field(data: &Map<String, JsonValue>, path: &str, field: &str) -> Result<String, SecretError> {
    optional_field(data, field).ok_or_else(|| SecretError::MissingField {
        path: path.to_string(),
        field: field.to_string(),
    })
}

/// A string field, treating blank values as absent.
fn optional_field(data: &Map<String, JsonValue>, field: &str) -> Option<String> {
    data.get(field)
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl SecretResolver for VaultSecretResolver {
    #[instrument(skip(self))]
    async fn resolve_webhook(&self, pipeline: &str) -> Result<WebhookSecret, SecretError> {
        let (path, data) = self.read(&["jenkins", pipeline]).await?;

        Ok(WebhookSecret {
            url: required_field(&data, &path, "webhook_url")?,
            token: optional_field(&data, "webhook_token"),
        })
    }

    #[instrument(skip(self))]
    async fn resolve_jenkins_credentials(&self) -> Result<JenkinsCredentials, SecretError> {
        let (path, data) = self.read(&["jenkins"]).await?;

        Ok(JenkinsCredentials {
            username: required_field(&data, &path, "username")?,
            api_token: required_field(&data, &path, "api_token")?,
        })
    }
}
