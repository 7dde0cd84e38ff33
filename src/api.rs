//! HTTP and WebSocket surface

mod handlers;
mod types;
mod ws;

pub use handlers::create_router;

use crate::config::RelayConfig;
use crate::runtime::Relay;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub config: Arc<RelayConfig>,
}

impl AppState {
    pub fn new(relay: Relay, config: RelayConfig) -> Self {
        Self {
            relay: Arc::new(relay),
            config: Arc::new(config),
        }
    }
}
