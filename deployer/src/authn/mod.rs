//! Request authentication

pub mod secret;
pub mod signature;
