//! Server state

use std::sync::Arc;

use crate::authn::secret::WebhookSecret;
use crate::deploy::pipeline::Deployer;

/// Server state shared across handlers
#[derive(Debug)]
pub struct ServerState {
    pub secret: WebhookSecret,
    pub deployer: Arc<Deployer>,
}

impl ServerState {
    pub fn new(secret: WebhookSecret, deployer: Arc<Deployer>) -> Self {
        Self { secret, deployer }
    }
}
