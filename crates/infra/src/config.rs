//! Configuration loading and representation.
//!
//! Values come from an optional `config.{toml,yaml,json}` file in the working
//! directory, overridden by environment variables (`REDIS_HOST`, `PORT`, ...).
//! Every option has a default so the service starts with an empty environment.

use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::jobs::StoreKeys;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How a dequeued job is handed to Jenkins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// POST the parameters to a webhook URL resolved from Vault.
    #[default]
    Webhook,
    /// Call `buildWithParameters` with Jenkins credentials resolved from Vault.
    Direct,
}

#[derive(Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_redis_host")]
    pub redis_host: String,
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,

    #[serde(default = "default_vault_addr")]
    pub vault_addr: String,
    #[serde(default)]
    pub vault_token: String,
    #[serde(default = "default_vault_mount")]
    pub vault_mount: String,

    #[serde(default = "default_jenkins_url")]
    pub jenkins_url: String,
    #[serde(default = "default_pipeline_name")]
    pub pipeline_name: String,
    #[serde(default = "default_branch_name")]
    pub branch_name: String,
    #[serde(default)]
    pub trigger_mode: TriggerMode,

    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    /// Skip certificate validation on outbound calls (self-signed internal endpoints).
    #[serde(default = "default_true")]
    pub tls_insecure: bool,
    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub recover_processing_on_start: bool,

    #[serde(default = "default_queue_key")]
    pub queue_key: String,
    #[serde(default = "default_processing_key")]
    pub processing_key: String,
    #[serde(default = "default_status_key")]
    pub status_key: String,
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_vault_addr() -> String {
    "http://localhost:8200".to_string()
}

fn default_vault_mount() -> String {
    "secret".to_string()
}

fn default_jenkins_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_pipeline_name() -> String {
    "DR-Pipeline".to_string()
}

fn default_branch_name() -> String {
    "main".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_true() -> bool {
    true
}

fn default_webhook_timeout_secs() -> u64 {
    30
}

fn default_queue_key() -> String {
    "dr-queue".to_string()
}

fn default_processing_key() -> String {
    "dr-processing".to_string()
}

fn default_status_key() -> String {
    "jenkins_jobs".to_string()
}

impl AppConfig {
    /// Load from the optional config file and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::default())
            .build()?;

        Self::finish(config)
    }

    /// Load from an explicit variable map instead of the process environment.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: config::Map<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let config = Config::builder()
            .add_source(Environment::default().source(Some(vars)))
            .build()?;

        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self, ConfigError> {
        let cfg: Self = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline_name.trim().is_empty() {
            return Err(ConfigError::Invalid("PIPELINE_NAME must not be empty".into()));
        }
        if self.webhook_timeout_secs == 0 {
            return Err(ConfigError::Invalid("WEBHOOK_TIMEOUT_SECS must be positive".into()));
        }
        for (name, key) in [
            ("QUEUE_KEY", &self.queue_key),
            ("PROCESSING_KEY", &self.processing_key),
            ("STATUS_KEY", &self.status_key),
        ] {
            if key.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }

    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.redis_host, self.redis_port)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }

    pub fn store_keys(&self) -> StoreKeys {
        StoreKeys {
            queue: self.queue_key.clone(),
            processing: self.processing_key.clone(),
            statuses: self.status_key.clone(),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("redis_host", &self.redis_host)
            .field("redis_port", &self.redis_port)
            .field("vault_addr", &self.vault_addr)
            .field("vault_token", &"<redacted>")
            .field("vault_mount", &self.vault_mount)
            .field("jenkins_url", &self.jenkins_url)
            .field("pipeline_name", &self.pipeline_name)
            .field("branch_name", &self.branch_name)
            .field("trigger_mode", &self.trigger_mode)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls_insecure", &self.tls_insecure)
            .field("webhook_timeout_secs", &self.webhook_timeout_secs)
            .field("recover_processing_on_start", &self.recover_processing_on_start)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_with_empty_environment() {
        let cfg = AppConfig::from_vars(Vec::<(String, String)>::new()).unwrap();

        assert_eq!(cfg.redis_url(), "redis://localhost:6379/");
        assert_eq!(cfg.vault_addr, "http://localhost:8200");
        assert_eq!(cfg.vault_token, "");
        assert_eq!(cfg.pipeline_name, "DR-Pipeline");
        assert_eq!(cfg.branch_name, "main");
        assert_eq!(cfg.trigger_mode, TriggerMode::Webhook);
        assert_eq!(cfg.listen_addr(), "0.0.0.0:3000");
        assert_eq!(cfg.webhook_timeout(), Duration::from_secs(30));
        assert!(cfg.tls_insecure);
        assert!(cfg.recover_processing_on_start);

        let keys = cfg.store_keys();
        assert_eq!(keys, StoreKeys::default());
    }

    #[test]
    fn environment_overrides_defaults() {
        let cfg = AppConfig::from_vars([
            ("REDIS_HOST", "redis.internal"),
            ("REDIS_PORT", "6380"),
            ("VAULT_ADDR", "https://vault.internal:8200"),
            ("VAULT_TOKEN", "s.abcdef"),
            ("PIPELINE_NAME", "Failover"),
            ("TRIGGER_MODE", "direct"),
            ("PORT", "8088"),
            ("TLS_INSECURE", "false"),
        ])
        .unwrap();

        assert_eq!(cfg.redis_url(), "redis://redis.internal:6380/");
        assert_eq!(cfg.vault_token, "s.abcdef");
        assert_eq!(cfg.pipeline_name, "Failover");
        assert_eq!(cfg.trigger_mode, TriggerMode::Direct);
        assert_eq!(cfg.port, 8088);
        assert!(!cfg.tls_insecure);
    }

    #[test]
    fn numeric_looking_strings_stay_verbatim() {
        let cfg = AppConfig::from_vars([
            ("VAULT_TOKEN", "0123"),
            ("PIPELINE_NAME", "007"),
            ("BRANCH_NAME", "1.10"),
            ("REDIS_PORT", "6390"),
            ("RECOVER_PROCESSING_ON_START", "false"),
        ])
        .unwrap();

        assert_eq!(cfg.vault_token, "0123");
        assert_eq!(cfg.pipeline_name, "007");
        assert_eq!(cfg.branch_name, "1.10");
        assert_eq!(cfg.redis_port, 6390);
        assert!(!cfg.recover_processing_on_start);
    }

    #[test]
    fn empty_pipeline_name_is_rejected() {
        let err = AppConfig::from_vars([("PIPELINE_NAME", " ")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unparsable_port_is_rejected() {
        assert!(AppConfig::from_vars([("PORT", "not-a-port")]).is_err());
    }

    #[test]
    fn debug_output_hides_vault_token() {
        let cfg = AppConfig::from_vars([("VAULT_TOKEN", "s.super-secret")]).unwrap();
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("s.super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
