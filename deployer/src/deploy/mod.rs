//! Deployment module

pub mod compose;
pub mod executor;
pub mod fsm;
pub mod pipeline;
pub mod ports;
