//! Deployment models

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::errors::ValidationError;
use crate::models::webhook::WebhookPayload;

/// Longest tag accepted by container registries
const MAX_TAG_LEN: usize = 128;

/// The `owner/name` pair identifying a deployable unit.
///
/// Both parts are non-empty and restricted to ASCII alphanumerics, `-`, `_`
/// and `.`; the names `.` and `..` are refused because each part becomes a
/// directory under the deployment root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoIdentity {
    owner: String,
    name: String,
}

impl RepoIdentity {
    pub fn new(owner: &str, name: &str) -> Result<Self, ValidationError> {
        if !is_valid_component(owner) || !is_valid_component(name) {
            return Err(ValidationError::InvalidRepo);
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    /// Parse `owner/name`; exactly one `/` is allowed.
    pub fn parse(full_name: &str) -> Result<Self, ValidationError> {
        let mut parts = full_name.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) => Self::new(owner, name),
            _ => Err(ValidationError::InvalidRepo),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for RepoIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoIdentity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_valid_component(part: &str) -> bool {
    !part.is_empty()
        && part != "."
        && part != ".."
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Check an image tag: non-empty, `[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}`.
pub fn validate_tag(tag: &str) -> Result<(), ValidationError> {
    if tag.is_empty() {
        return Err(ValidationError::TagRequired);
    }

    let mut chars = tag.chars();
    let leading_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));

    if !leading_ok || !rest_ok || tag.len() > MAX_TAG_LEN {
        return Err(ValidationError::InvalidTag);
    }
    Ok(())
}

/// A caller-supplied compose file, already decoded from base64.
///
/// Its contents are written verbatim without any structural check: whoever
/// holds the webhook secret can run arbitrary compose configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct SuppliedDescriptor(Vec<u8>);

impl SuppliedDescriptor {
    /// Decode standard base64, ignoring ASCII whitespace so line-wrapped
    /// payloads are accepted. An empty payload is refused.
    pub fn from_base64(encoded: &str) -> Result<Self, ValidationError> {
        let compact: String = encoded
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        if compact.is_empty() {
            return Err(ValidationError::InvalidDescriptor);
        }

        BASE64
            .decode(compact.as_bytes())
            .map(Self)
            .map_err(|_| ValidationError::InvalidDescriptor)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SuppliedDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SuppliedDescriptor({} bytes)", self.0.len())
    }
}

/// A validated deployment request
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    pub identity: RepoIdentity,
    pub tag: String,

    /// Present when the caller supplied the compose file; otherwise it is
    /// generated from the template.
    pub descriptor: Option<SuppliedDescriptor>,
}

impl DeploymentRequest {
    /// Validate a raw webhook body.
    pub fn from_body(body: &[u8]) -> Result<Self, ValidationError> {
        let payload = WebhookPayload::from_body(body)?;
        Self::from_payload(payload)
    }

    pub fn from_payload(payload: WebhookPayload) -> Result<Self, ValidationError> {
        let repo = payload.repo.ok_or(ValidationError::InvalidRepo)?;
        let identity = RepoIdentity::parse(&repo)?;

        let tag = payload.tag.unwrap_or_default();
        validate_tag(&tag)?;

        let descriptor = payload
            .compose_b64
            .as_deref()
            .map(SuppliedDescriptor::from_base64)
            .transpose()?;

        Ok(Self {
            identity,
            tag,
            descriptor,
        })
    }

    pub fn mode(&self) -> &'static str {
        if self.descriptor.is_some() {
            "supplied"
        } else {
            "template"
        }
    }
}
