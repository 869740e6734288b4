//! Services bridging handlers and `deploy_core`.

pub mod auth;
pub mod cookies;
