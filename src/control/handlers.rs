use crate::error::WorkloadError;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::server::ControlState;

#[derive(Debug, Deserialize)]
pub struct JobRequest {
    pub duration_ms: Option<u64>,
}

/// Liveness and readiness probe; 200 only while Ready
pub async fn health_handler(State(state): State<ControlState>) -> impl IntoResponse {
    let process_state = state.pool.gate().state();
    let status = if process_state.accepts_work() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = serde_json::json!({
        "status": process_state,
        "pid": std::process::id(),
        "in_flight": state.pool.gate().in_flight(),
    });

    (status, Json(body))
}

/// Submit a job that runs as tracked in-flight work
pub async fn submit_job_handler(
    State(state): State<ControlState>,
    Query(request): Query<JobRequest>,
) -> impl IntoResponse {
    let duration = request
        .duration_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| state.pool.settings().unit_duration());

    match state.pool.submit(duration) {
        Ok(job) => {
            debug!("Accepted job {} via control plane", job.id);
            (StatusCode::ACCEPTED, Json(serde_json::json!(job)))
        }
        Err(e @ WorkloadError::NotAccepting { .. }) => {
            warn!("Rejected job: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        }
        Err(e @ WorkloadError::DurationTooLong { .. }) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}

/// Workload counters
pub async fn stats_handler(State(state): State<ControlState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "state": state.pool.gate().state(),
        "workload": state.pool.stats(),
        "settings": state.pool.settings(),
    });

    (StatusCode::OK, Json(body))
}
