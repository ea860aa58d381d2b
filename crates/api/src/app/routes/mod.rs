use axum::{
    routing::{get, post},
    Router,
};

pub mod jobs;
pub mod queue;
pub mod system;
pub mod trigger;

/// Router for every endpoint. There is no authentication layer; the service
/// is expected to sit on an internal network.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/trigger", post(trigger::trigger))
        .route("/queue/status", get(queue::status))
        .route("/job/:job_id/status", get(jobs::status))
}
