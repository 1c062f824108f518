//! Shared webhook secret

use std::fmt;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretBox};

/// The shared HMAC secret, zeroed on drop and redacted from `Debug`.
///
/// An empty secret is valid configuration: it rejects every request.
#[derive(Clone)]
pub struct WebhookSecret {
    inner: Arc<SecretBox<Vec<u8>>>,
}

impl WebhookSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            inner: Arc::new(SecretBox::new(Box::new(bytes.into()))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.expose_secret().is_empty()
    }

    pub fn expose(&self) -> &[u8] {
        self.inner.expose_secret()
    }
}

impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebhookSecret([REDACTED])")
    }
}
