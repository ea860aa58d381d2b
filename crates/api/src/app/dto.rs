use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use drtrigger_core::{JobId, JobParameters, TriggerRequest};

// -------------------------
// Request DTOs
// -------------------------

/// Parse a `/trigger` body. An empty (or whitespace-only) body means `{}`;
/// only a body that is not JSON at all is an error.
pub fn parse_trigger_request(body: &[u8]) -> Result<TriggerRequest, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(TriggerRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| format!("invalid trigger body: {e}"))
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub message: &'static str,
    pub job_id: JobId,
    pub parameters: JobParameters,
    pub queue_position: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub redis: &'static str,
}

#[derive(Debug, Serialize)]
pub struct QueueStatusResponse {
    pub queued: u64,
    pub processing: u64,
    pub timestamp: String,
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_an_empty_request() {
        assert_eq!(parse_trigger_request(b"").unwrap(), TriggerRequest::default());
        assert_eq!(parse_trigger_request(b"  \n").unwrap(), TriggerRequest::default());
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(parse_trigger_request(b"{not json").is_err());
        assert!(parse_trigger_request(b"\xff").is_err());
    }

    #[test]
    fn mistyped_parameters_are_absorbed() {
        let request = parse_trigger_request(br#"{"parameters":"yes"}"#).unwrap();
        assert_eq!(request, TriggerRequest { parameters: Some(Default::default()) });

        let request = parse_trigger_request(br#"{"parameters":{"skip_tests":{"x":1}}}"#).unwrap();
        let skip = request.parameters.and_then(|p| p.skip_tests);
        assert!(skip.is_none());
    }

    #[test]
    fn timestamps_use_millis_and_z() {
        let at = DateTime::parse_from_rfc3339("2024-05-29T16:26:40.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(timestamp(at), "2024-05-29T16:26:40.123Z");
    }
}
