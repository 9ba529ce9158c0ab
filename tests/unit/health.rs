//! Probe and metrics router tests

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use kube_admission::HealthState;
use kube_admission::health::create_router;
use tower::ServiceExt;

async fn get(state: Arc<HealthState>, uri: &str) -> (StatusCode, String) {
    let response = create_router(state)
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_health_is_always_ok() {
    let state = Arc::new(HealthState::new());

    let (status, body) = get(state, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_readyz_follows_ready_flag() {
    let state = Arc::new(HealthState::new());

    let (status, _) = get(state.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    state.set_ready(true).await;
    let (status, body) = get(state.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ready");

    state.set_ready(false).await;
    let (status, _) = get(state, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_counters() {
    let state = Arc::new(HealthState::new());
    state.metrics.record_review("DELETE", "allowed", 0.001);

    let (status, body) = get(state, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("kube_admission_reviews_total"));
    assert!(body.contains("operation=\"DELETE\""));
}
