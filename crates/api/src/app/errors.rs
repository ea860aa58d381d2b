use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Error body without a detail message, e.g. `{"error":"Job not found"}`.
pub fn bare_error(status: StatusCode, error: &'static str) -> axum::response::Response {
    (status, axum::Json(json!({ "error": error }))).into_response()
}
