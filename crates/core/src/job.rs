//! Job record and its status lifecycle.
//!
//! A job starts `queued` and ends in exactly one of `triggered` or `failed`.
//! Terminal jobs never move again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::JobId;
use crate::parameters::JobParameters;

/// Error text recorded when a failure arrives without a message.
const UNSPECIFIED_FAILURE: &str = "dispatch failed";

/// Coarse job status, as exposed in the `status` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Triggered,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Triggered => "triggered",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Queued)
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status plus the fields that only exist for that status.
///
/// Flattened into [`JobRecord`] so the stored JSON stays a single flat object
/// (`status`, `jenkins_triggered_at`, `error`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Triggered {
        jenkins_triggered_at: DateTime<Utc>,
        jenkins_response_status: u16,
    },
    Failed {
        error: String,
        failed_at: DateTime<Utc>,
    },
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Queued => JobStatus::Queued,
            JobState::Triggered { .. } => JobStatus::Triggered,
            JobState::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// A DR trigger job, as queued and as kept in the status table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub timestamp: DateTime<Utc>,
    pub parameters: JobParameters,
    pub source: String,
    #[serde(flatten)]
    pub state: JobState,
}

impl JobRecord {
    /// A freshly queued job.
    pub fn queued(
        id: JobId,
        timestamp: DateTime<Utc>,
        parameters: JobParameters,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id,
            timestamp,
            parameters,
            source: source.into(),
            state: JobState::Queued,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Record a successful hand-off to the pipeline.
    pub fn mark_triggered(&mut self, response_status: u16, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_queued(JobStatus::Triggered)?;
        self.state = JobState::Triggered {
            jenkins_triggered_at: at,
            jenkins_response_status: response_status,
        };
        Ok(())
    }

    /// Record a failed dispatch attempt. The error text is never left empty.
    pub fn mark_failed(&mut self, error: impl Into<String>, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_queued(JobStatus::Failed)?;
        let mut error = error.into();
        if error.trim().is_empty() {
            error = UNSPECIFIED_FAILURE.to_string();
        }
        self.state = JobState::Failed {
            error,
            failed_at: at,
        };
        Ok(())
    }

    fn ensure_queued(&self, to: JobStatus) -> DomainResult<()> {
        let from = self.status();
        if from != JobStatus::Queued {
            return Err(DomainError::invalid_transition(self.id.as_str(), from, to));
        }
        Ok(())
    }
}
