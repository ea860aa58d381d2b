use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use tracing::error;

use drtrigger_infra::jobs::JobStoreError;

use crate::app::{dto, errors, AppState};

pub async fn status(Extension(state): Extension<Arc<AppState>>) -> axum::response::Response {
    match depths(&state).await {
        Ok((queued, processing)) => Json(dto::QueueStatusResponse {
            queued,
            processing,
            timestamp: dto::timestamp(Utc::now()),
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "failed to read queue depths");
            errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get queue status", e.to_string())
        }
    }
}

async fn depths(state: &AppState) -> Result<(u64, u64), JobStoreError> {
    Ok((state.store.queue_depth().await?, state.store.processing_depth().await?))
}
