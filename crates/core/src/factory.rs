//! Job factory: inbound trigger request -> queued job record.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::id::JobId;
use crate::job::JobRecord;
use crate::parameters::{JobParameters, RequestParameters};

/// Origin tag used when the caller did not identify itself.
pub const DEFAULT_SOURCE: &str = "api";

/// Body of a trigger submission. Every field is optional, and any
/// well-formed JSON document is accepted.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub struct TriggerRequest {
    pub parameters: Option<RequestParameters>,
}

impl From<Value> for TriggerRequest {
    fn from(mut value: Value) -> Self {
        let parameters = match value.get_mut("parameters").map(Value::take) {
            None | Some(Value::Null) => None,
            Some(params) => Some(RequestParameters::from(params)),
        };
        Self { parameters }
    }
}

/// Builds canonical job records. Pure: no I/O, never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobFactory;

impl JobFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn create_job(&self, request: &TriggerRequest, source: &str) -> JobRecord {
        self.create_job_at(request, source, Utc::now())
    }

    /// Same as [`JobFactory::create_job`] with an explicit clock.
    pub fn create_job_at(&self, request: &TriggerRequest, source: &str, now: DateTime<Utc>) -> JobRecord {
        let parameters = request
            .parameters
            .as_ref()
            .map(JobParameters::from_request)
            .unwrap_or_default();

        let source = match source.trim() {
            "" => DEFAULT_SOURCE,
            s => s,
        };

        JobRecord::queued(JobId::generate_at(now), now, parameters, source)
    }
}
