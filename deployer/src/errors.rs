//! Error types for the webhook deployer

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::deploy::executor::{DeploymentOutcome, Phase};
use crate::models::webhook::ErrorResponse;

/// Reasons a webhook payload is rejected before anything touches the disk.
///
/// The `Display` text is the exact reason returned to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Empty payload")]
    EmptyPayload,

    #[error("Invalid JSON")]
    InvalidJson,

    #[error("Invalid repo format")]
    InvalidRepo,

    #[error("Tag is required")]
    TagRequired,

    #[error("Invalid tag format")]
    InvalidTag,

    #[error("Invalid compose_b64")]
    InvalidDescriptor,
}

/// Main error type for the webhook deployer
#[derive(Error, Debug)]
pub enum DeployerError {
    #[error("Invalid signature")]
    AuthenticationFailure,

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Port allocation error: {0}")]
    AllocationError(String),

    #[error("Failed to launch compose ({phase}): {message}")]
    ExecutionError { phase: Phase, message: String },

    #[error("{} phase failed with exit code {:?}", .0.phase, .0.exit_code)]
    PhaseFailed(Box<DeploymentOutcome>),

    #[error("{phase} phase timed out after {timeout:?}")]
    Timeout { phase: Phase, timeout: Duration },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeployerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthenticationFailure => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::AllocationError(_)
            | Self::ExecutionError { .. }
            | Self::PhaseFailed(_)
            | Self::Timeout { .. }
            | Self::IoError(_)
            | Self::JsonError(_)
            | Self::ConfigError(_)
            | Self::ServerError(_)
            | Self::ShutdownError(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body returned to the caller. Internal details stay in the logs.
    pub fn to_response_body(&self) -> ErrorResponse {
        match self {
            Self::AuthenticationFailure => ErrorResponse::new("Invalid signature"),
            Self::Validation(reason) => ErrorResponse::new(reason.to_string()),
            Self::AllocationError(_) => ErrorResponse::new("Port allocation failed"),
            Self::ExecutionError { .. } => ErrorResponse::new("Failed to launch compose"),
            Self::PhaseFailed(outcome) => ErrorResponse::new(format!("{} failed", outcome.phase))
                .with_output(outcome.stdout.clone(), outcome.stderr.clone()),
            Self::Timeout { phase, .. } => ErrorResponse::new(format!("{phase} timed out")),
            Self::IoError(_)
            | Self::JsonError(_)
            | Self::ConfigError(_)
            | Self::ServerError(_)
            | Self::ShutdownError(_)
            | Self::Internal(_) => ErrorResponse::new("Internal server error"),
        }
    }
}

impl IntoResponse for DeployerError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_response_body())).into_response()
    }
}
