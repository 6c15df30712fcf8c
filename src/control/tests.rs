use super::server::ControlServer;
use crate::config::{ControlConfig, WorkloadConfig};
use crate::lifecycle::{LifecycleCore, SignalEvent, SignalKind};
use crate::workload::WorkerPool;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn test_server(core: &LifecycleCore) -> ControlServer {
    let pool = Arc::new(WorkerPool::new(
        core.work_gate(),
        WorkloadConfig {
            workers: 1,
            unit_duration_ms: 20,
            max_job_duration_ms: 500,
        },
    ));
    ControlServer::new(
        ControlConfig {
            enabled: true,
            ip: "127.0.0.1".to_string(),
            port: 0,
        },
        pool,
    )
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_reflects_process_state() {
    let core = LifecycleCore::new(Duration::from_secs(5));
    let server = test_server(&core);

    let response = server
        .router()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["status"], "starting");

    core.mark_ready();
    let response = server
        .router()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ready");
}

#[tokio::test]
async fn test_job_submission_follows_admission() {
    let core = LifecycleCore::new(Duration::from_secs(5));
    core.mark_ready();
    let server = test_server(&core);

    let response = server
        .router()
        .oneshot(
            Request::post("/jobs?duration_ms=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(json_body(response).await["duration"], 10);

    let response = server
        .router()
        .oneshot(
            Request::post("/jobs?duration_ms=10000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    core.on_signal(SignalEvent::new(SignalKind::Terminate));
    let response = server
        .router()
        .oneshot(Request::post("/jobs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_stats_endpoint() {
    let core = LifecycleCore::new(Duration::from_secs(5));
    core.mark_ready();
    let server = test_server(&core);

    let response = server
        .router()
        .oneshot(Request::get("/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["state"], "ready");
    assert_eq!(body["workload"]["jobs_accepted"], 0);
    assert_eq!(body["settings"]["max_job_duration_ms"], 500);
}

#[tokio::test]
async fn test_bind_reports_ephemeral_port() {
    let core = LifecycleCore::new(Duration::from_secs(5));
    let server = test_server(&core);

    let bound = server.bind().await.unwrap();
    assert_ne!(bound.local_addr().port(), 0);
}
