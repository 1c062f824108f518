//! Webhook Deployer Library
//!
//! Core modules for the webhook-triggered docker-compose deployer.

pub mod app;
pub mod authn;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod server;
pub mod storage;
pub mod utils;
