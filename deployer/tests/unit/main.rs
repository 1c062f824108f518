//! Integration tests for the webhook deployer

mod test_executor;
mod test_webhook;
