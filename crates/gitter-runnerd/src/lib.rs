//! Gitter Runner daemon
//!
//! Receives GitHub webhook deliveries, checks their signature, and hands
//! pull-request events to the core dispatcher.

pub mod config;
pub mod server;
pub mod signature;

pub use config::Config;
pub use server::{router, AppState, HealthResponse, WebhookResponse};
pub use signature::SignatureError;
