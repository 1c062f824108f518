//! Webhook wire models

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// Body of `POST /webhook`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// `owner/name`
    #[serde(default)]
    pub repo: Option<String>,

    /// Image tag that was published
    #[serde(default)]
    pub tag: Option<String>,

    /// Optional base64 encoded compose file used instead of the template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compose_b64: Option<String>,
}

impl WebhookPayload {
    /// Parse the raw body. An empty body (or a JSON `null`) is
    /// `EmptyPayload`; anything else that is not a JSON object is
    /// `InvalidJson`.
    pub fn from_body(body: &[u8]) -> Result<Self, ValidationError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(ValidationError::EmptyPayload);
        }

        let payload: Option<WebhookPayload> =
            serde_json::from_slice(body).map_err(|_| ValidationError::InvalidJson)?;
        payload.ok_or(ValidationError::EmptyPayload)
    }
}

/// Returned when both phases succeeded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub status: String,
    pub repo: String,
    pub tag: String,
}

impl SuccessResponse {
    pub fn new(repo: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            repo: repo.into(),
            tag: tag.into(),
        }
    }
}

/// Returned for every rejected or failed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            stdout: None,
            stderr: None,
        }
    }

    pub fn with_output(mut self, stdout: String, stderr: String) -> Self {
        self.stdout = Some(stdout);
        self.stderr = Some(stderr);
        self
    }
}
