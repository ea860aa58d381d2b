//! Webhook trigger: POST `{"parameters": {...}}` to a URL resolved from the
//! secret store on every call.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use tracing::{info, instrument};

use drtrigger_core::{JobParameters, JobRecord};

use super::{receipt_from, redact_url, transport_error, DispatchError, PipelineTrigger, TriggerReceipt};
use crate::secrets::SecretResolver;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    parameters: &'a JobParameters,
}

#[derive(Clone)]
pub struct WebhookTrigger {
    client: reqwest::Client,
    secrets: Arc<dyn SecretResolver>,
    pipeline: String,
}

impl WebhookTrigger {
    pub fn new(client: reqwest::Client, secrets: Arc<dyn SecretResolver>, pipeline: impl Into<String>) -> Self {
        Self {
            client,
            secrets,
            pipeline: pipeline.into(),
        }
    }
}

#[async_trait]
impl PipelineTrigger for WebhookTrigger {
    fn mode(&self) -> &'static str {
        "webhook"
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, pipeline = %self.pipeline))]
    async fn trigger(&self, job: &JobRecord) -> Result<TriggerReceipt, DispatchError> {
        let secret = self.secrets.resolve_webhook(&self.pipeline).await?;

        let mut url = Url::parse(&secret.url)
            .map_err(|e| DispatchError::InvalidTarget(format!("{}: {e}", redact_url(&secret.url))))?;
        if let Some(token) = &secret.token {
            url.query_pairs_mut().append_pair("token", token);
        }

        let response = self
            .client
            .post(url.clone())
            .json(&WebhookPayload {
                parameters: &job.parameters,
            })
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        let receipt = receipt_from(&response)?;
        info!(target_url = %redact_url(url.as_str()), status = receipt.status, "webhook accepted");
        Ok(receipt)
    }
}
