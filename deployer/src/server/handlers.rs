//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::{error, field, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::authn::signature::{verify, SIGNATURE_HEADER};
use crate::deploy::fsm::{RequestEvent, RequestFsm};
use crate::errors::DeployerError;
use crate::models::deployment::DeploymentRequest;
use crate::models::webhook::SuccessResponse;
use crate::server::state::ServerState;
use crate::utils::version_info;

pub const SERVICE_NAME: &str = "webhook-deployer";

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// `POST /webhook`
pub async fn webhook_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SuccessResponse>, DeployerError> {
    let span = info_span!(
        "webhook",
        request_id = %Uuid::new_v4(),
        repo = field::Empty,
        tag = field::Empty
    );
    // A client that disconnects early does not cut the deployment short
    tokio::spawn(handle_webhook(state, headers, body).instrument(span))
        .await
        .map_err(|e| DeployerError::Internal(format!("webhook task failed: {e}")))?
}

async fn handle_webhook(
    state: Arc<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SuccessResponse>, DeployerError> {
    let mut fsm = RequestFsm::new();
    let result = process_webhook(&state, &headers, &body, &mut fsm).await;

    if let Err(e) = &result {
        if let Err(transition) = fsm.process(RequestEvent::Fail(e.to_string())) {
            warn!("Unable to record failure: {transition}");
        }
        log_failure(e, &fsm);
    }
    if let Err(transition) = fsm.process(RequestEvent::Respond) {
        warn!("Unable to record response: {transition}");
    }

    result.map(Json)
}

async fn process_webhook(
    state: &ServerState,
    headers: &HeaderMap,
    body: &[u8],
    fsm: &mut RequestFsm,
) -> Result<SuccessResponse, DeployerError> {
    let presented = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !verify(state.secret.expose(), body, presented) {
        return Err(DeployerError::AuthenticationFailure);
    }
    fsm.advance(RequestEvent::SignatureVerified)?;

    let request = DeploymentRequest::from_body(body)?;
    fsm.advance(RequestEvent::PayloadAccepted)?;

    let span = Span::current();
    span.record("repo", field::display(&request.identity));
    span.record("tag", field::display(&request.tag));
    info!(mode = request.mode(), "Deploying");

    let report = state.deployer.deploy(&request, fsm).await?;
    Ok(SuccessResponse::new(report.identity.to_string(), report.tag))
}

fn log_failure(err: &DeployerError, fsm: &RequestFsm) {
    let stage = fsm.failed_at();
    match err {
        // Nothing from an unauthenticated body is logged
        DeployerError::AuthenticationFailure => warn!("Rejected request with invalid signature"),
        DeployerError::Validation(reason) => warn!(?stage, "Rejected payload: {reason}"),
        DeployerError::PhaseFailed(outcome) => error!(
            ?stage,
            exit_code = ?outcome.exit_code,
            stderr = %outcome.stderr,
            "{} failed",
            outcome.phase
        ),
        other => error!(?stage, "Deployment failed: {other}"),
    }
}
