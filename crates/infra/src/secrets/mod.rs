//! Secret resolution (Jenkins webhook endpoints and credentials).

pub mod vault;

use async_trait::async_trait;

pub use vault::VaultSecretResolver;

/// Webhook endpoint for one pipeline.
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookSecret {
    pub url: String,
    /// Optional shared token, sent as the `token` query parameter.
    pub token: Option<String>,
}

impl std::fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSecret")
            .field("url", &crate::trigger::redact_url(&self.url))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Jenkins API credentials for direct triggering.
#[derive(Clone, PartialEq, Eq)]
pub struct JenkinsCredentials {
    pub username: String,
    pub api_token: String,
}

impl std::fmt::Debug for JenkinsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JenkinsCredentials")
            .field("username", &self.username)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SecretError {
    #[error("secret store unreachable: {0}")]
    Unreachable(String),

    #[error("secret store rejected read of {path} with status {status}")]
    Rejected { path: String, status: u16 },

    #[error("secret at {path} has no usable '{field}' field")]
    MissingField { path: String, field: String },

    #[error("secret at {path} is malformed: {reason}")]
    Malformed { path: String, reason: String },
}

/// Looks up the secrets the dispatcher needs, once per dispatch.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn resolve_webhook(&self, pipeline: &str) -> Result<WebhookSecret, SecretError>;

    async fn resolve_jenkins_credentials(&self) -> Result<JenkinsCredentials, SecretError>;
}
