use std::sync::Arc;

use axum::{extract::Extension, Json};
use chrono::Utc;
use tracing::warn;

use crate::app::{dto, AppState};

/// Liveness plus a store connectivity probe. Always 200; the probe result is
/// reported in the body.
pub async fn health(Extension(state): Extension<Arc<AppState>>) -> Json<dto::HealthResponse> {
    let redis = match state.store.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            warn!(error = %e, "store ping failed");
            "disconnected"
        }
    };

    Json(dto::HealthResponse {
        status: "healthy",
        timestamp: dto::timestamp(Utc::now()),
        redis,
    })
}
