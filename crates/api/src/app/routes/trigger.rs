use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::Extension,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use tracing::{error, info};

use drtrigger_core::DEFAULT_SOURCE;

use crate::app::{dto, errors, AppState};

/// Accept a DR trigger request and queue it. Dispatch happens later on the
/// dispatcher task; callers poll `/job/:job_id/status` for the outcome.
pub async fn trigger(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let request = match dto::parse_trigger_request(&body) {
        Ok(request) => request,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_request", msg),
    };

    let source = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_SOURCE);

    let job = state.factory.create_job(&request, source);

    match state.store.enqueue(&job).await {
        Ok(queue_position) => {
            info!(job_id = %job.id, queue_position, source = %job.source, "DR job queued");
            Json(dto::TriggerResponse {
                status_code: 200,
                message: "DR job queued successfully",
                job_id: job.id,
                parameters: job.parameters,
                queue_position,
            })
            .into_response()
        }
        Err(e) => {
            error!(job_id = %job.id, error = %e, "failed to queue DR job");
            errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "Trigger execution failed", e.to_string())
        }
    }
}
