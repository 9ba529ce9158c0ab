//! Webhook HTTP server
//!
//! Terminates the API server's POST, parses the AdmissionReview, runs the
//! dispatcher and serializes the response envelope. The admission outcome is
//! carried in `response.allowed`; HTTP status is 200 for every review that
//! has a uid to answer, 400 otherwise.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use super::dispatch::Dispatcher;
use super::response::{AdmissionReviewResponse, ReviewResponse, deny};
use crate::config::WebhookConfig;
use crate::health::HealthState;
use crate::review::ReviewRequest;

/// Shared state for webhook handlers
pub struct WebhookState {
    pub dispatcher: Dispatcher,
    pub health: Arc<HealthState>,
}

impl WebhookState {
    pub fn new(dispatcher: Dispatcher, health: Arc<HealthState>) -> Self {
        Self { dispatcher, health }
    }
}

/// Create the webhook router
pub fn create_webhook_router(state: Arc<WebhookState>, admission_path: &str) -> Router {
    Router::new()
        .route(admission_path, post(admit))
        .route("/health", get(health))
        .with_state(state)
}

/// Liveness on the webhook listener. Empty body.
async fn health() -> StatusCode {
    StatusCode::OK
}

fn outcome(response: &ReviewResponse) -> &'static str {
    match (response.allowed, response.patch.is_some()) {
        (true, true) => "patched",
        (true, false) => "allowed",
        (false, _) => "denied",
    }
}

/// Admission review handler
async fn admit(State(state): State<Arc<WebhookState>>, body: Bytes) -> Response {
    let started = Instant::now();
    let metrics = &state.health.metrics;

    let request = match ReviewRequest::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to extract admission request");
            metrics.record_error("MalformedRequest");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let uid = request.uid();
    info!(
        uid = %uid,
        operation = ?request.operation(),
        namespace = ?request.namespace(),
        name = ?request.name(),
        dry_run = request.dry_run(),
        "Processing admission request"
    );

    let response = match state.dispatcher.dispatch(&request).await {
        Ok(response) => response,
        Err(e) => {
            error!(uid = %uid, kind = e.kind(), error = %e, "Admission classification failed");
            metrics.record_error(e.kind());
            deny(&request, format!("{}: {}", e.kind(), e))
        }
    };

    let result = outcome(&response);
    if response.allowed {
        info!(uid = %uid, outcome = result, "Admission request allowed");
    } else {
        warn!(uid = %uid, status = ?response.status, "Admission request denied");
    }

    let operation = request.operation().map_or("UNKNOWN", |op| op.as_str());
    metrics.record_review(operation, result, started.elapsed().as_secs_f64());

    (
        StatusCode::OK,
        Json(AdmissionReviewResponse::for_request(&request, response)),
    )
        .into_response()
}

/// Errors that can occur when running the webhook server
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Webhook server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Run the webhook server
///
/// Serves TLS when both certificate files named in `config` exist, plain
/// HTTP otherwise (for local testing or a TLS-terminating sidecar).
pub async fn run_webhook_server(
    config: &WebhookConfig,
    dispatcher: Dispatcher,
    health: Arc<HealthState>,
) -> Result<(), WebhookError> {
    use axum_server::tls_rustls::RustlsConfig;

    let state = Arc::new(WebhookState::new(dispatcher, health));
    let app = create_webhook_router(state, &config.admission_path);
    let addr = config.webhook_addr();

    if config.tls_enabled() {
        let tls = RustlsConfig::from_pem_file(&config.cert_path, &config.key_path)
            .await
            .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

        info!(%addr, path = %config.admission_path, "Webhook server listening with TLS");
        axum_server::bind_rustls(addr, tls)
            .serve(app.into_make_service())
            .await?;
    } else {
        warn!(
            cert_path = %config.cert_path.display(),
            "Webhook certificates not found, serving plain HTTP"
        );
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| WebhookError::Bind { addr, source })?;

        info!(%addr, path = %config.admission_path, "Webhook server listening");
        axum::serve(listener, app).await?;
    }

    Ok(())
}
