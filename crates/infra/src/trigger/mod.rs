//! Outbound pipeline triggers.
//!
//! A trigger turns one job into one downstream call. It resolves whatever
//! secrets it needs at call time and never retries; the dispatcher records
//! the outcome.

pub mod jenkins;
pub mod webhook;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use drtrigger_core::JobRecord;

use crate::secrets::SecretError;

pub use jenkins::JenkinsDirectTrigger;
pub use webhook::WebhookTrigger;

/// Result of an accepted (2xx) downstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerReceipt {
    pub status: u16,
    /// Jenkins queue item URL, when the target reports one.
    pub location: Option<String>,
}

/// Why a dispatch failed. The `Display` text is what ends up in the job's
/// `error` field.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error("Jenkins returned status {status}")]
    Rejected { status: u16 },

    #[error("request to {target} failed: {reason}")]
    Transport { target: String, reason: String },

    #[error("invalid trigger target: {0}")]
    InvalidTarget(String),
}

#[async_trait]
pub trait PipelineTrigger: Send + Sync {
    /// Short label for logs (`webhook`, `direct`).
    fn mode(&self) -> &'static str;

    async fn trigger(&self, job: &JobRecord) -> Result<TriggerReceipt, DispatchError>;
}

/// Shared outbound client for Vault and Jenkins calls.
///
/// `insecure` disables certificate validation for self-signed internal
/// endpoints.
pub fn build_http_client(timeout: Duration, insecure: bool) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(insecure)
        .build()
}

/// URL safe for logs: credentials and query string (which may carry a
/// token) are dropped.
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            let _ = url.set_username("");
            let _ = url.set_password(None);
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}

fn transport_error(target: &Url, err: reqwest::Error) -> DispatchError {
    let reason = if err.is_timeout() {
        "timed out".to_string()
    } else {
        err.without_url().to_string()
    };
    DispatchError::Transport {
        target: redact_url(target.as_str()),
        reason,
    }
}

/// Map a downstream response to a receipt, or `Rejected` for non-2xx.
fn receipt_from(response: &reqwest::Response) -> Result<TriggerReceipt, DispatchError> {
    let status = response.status();
    if !status.is_success() {
        return Err(DispatchError::Rejected { status: status.as_u16() });
    }
    let location = response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Ok(TriggerReceipt {
        status: status.as_u16(),
        location,
    })
}
