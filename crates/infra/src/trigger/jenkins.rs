//! Direct Jenkins trigger via `buildWithParameters`.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use tracing::{info, instrument};

use drtrigger_core::JobRecord;

use super::{receipt_from, transport_error, DispatchError, PipelineTrigger, TriggerReceipt};
use crate::secrets::SecretResolver;

#[derive(Clone)]
pub struct JenkinsDirectTrigger {
    client: reqwest::Client,
    secrets: Arc<dyn SecretResolver>,
    jenkins_url: String,
    pipeline: String,
    branch: String,
}

impl JenkinsDirectTrigger {
    pub fn new(
        client: reqwest::Client,
        secrets: Arc<dyn SecretResolver>,
        jenkins_url: impl Into<String>,
        pipeline: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            client,
            secrets,
            jenkins_url: jenkins_url.into(),
            pipeline: pipeline.into(),
            branch: branch.into(),
        }
    }

    /// `<jenkins>/job/<pipeline>/job/<branch>/buildWithParameters`, with each
    /// segment percent-encoded (branch names often contain `/`).
    pub fn build_url(&self) -> Result<Url, DispatchError> {
        let mut url = Url::parse(&self.jenkins_url)
            .map_err(|e| DispatchError::InvalidTarget(format!("{}: {e}", self.jenkins_url)))?;
        url.path_segments_mut()
            .map_err(|_| DispatchError::InvalidTarget(self.jenkins_url.clone()))?
            .pop_if_empty()
            .extend(["job", self.pipeline.as_str(), "job", self.branch.as_str(), "buildWithParameters"]);
        Ok(url)
    }
}

#[async_trait]
impl PipelineTrigger for JenkinsDirectTrigger {
    fn mode(&self) -> &'static str {
        "direct"
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, pipeline = %self.pipeline, branch = %self.branch))]
    async fn trigger(&self, job: &JobRecord) -> Result<TriggerReceipt, DispatchError> {
        let creds = self.secrets.resolve_jenkins_credentials().await?;
        let url = self.build_url()?;

        let response = self
            .client
            .post(url.clone())
            .basic_auth(&creds.username, Some(&creds.api_token))
            .form(&job.parameters.build_parameters()[..])
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        let receipt = receipt_from(&response)?;
        match &receipt.location {
            Some(location) => info!(status = receipt.status, queue_item = %location, "Jenkins build queued"),
            None => info!(status = receipt.status, "Jenkins build queued"),
        }
        Ok(receipt)
    }
}
