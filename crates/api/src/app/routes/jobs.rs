use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::error;

use drtrigger_core::JobId;

use crate::app::{errors, AppState};

/// Latest stored record for a job. Ids are looked up verbatim; anything
/// never written to the status table is a 404.
pub async fn status(
    Extension(state): Extension<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> axum::response::Response {
    let id = JobId::from_raw(job_id);

    match state.store.get_status(&id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => errors::bare_error(StatusCode::NOT_FOUND, "Job not found"),
        Err(e) => {
            error!(job_id = %id, error = %e, "failed to read job status");
            errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get job status", e.to_string())
        }
    }
}
