//! axum handlers and the state they share.

pub mod health;
pub mod service;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use service::binding_handler;

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::context::SosContext;

/// State handed to every handler. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub context: SosContext,
    pub shutdown: Arc<ShutdownController>,
    /// Used for uptime reporting.
    pub start_time: Instant,
}
