//! Runtime for executing calls
//!
//! Each relay connection gets a `SessionController` task that owns the call
//! state and runs effects one at a time. The `Relay` holds everything the
//! controllers share.

mod controller;
mod forward;
pub mod interleave;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use controller::{ControllerHandle, SessionController};
pub use forward::{HttpForwarder, NoopForwarder};
pub use traits::*;

use crate::conversation::ConversationStore;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outbound speech increment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamEvent {
    pub token: String,
    /// Set on tool results and on the end-of-turn sentinel
    pub last: bool,
}

impl StreamEvent {
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            last: false,
        }
    }

    pub fn last(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            last: true,
        }
    }

    /// End-of-turn sentinel
    pub fn end() -> Self {
        Self::last("")
    }
}

/// Where a call's outbound events go: the caller's socket, then the forwarder
#[derive(Clone)]
pub struct EventSink {
    outbound: mpsc::Sender<StreamEvent>,
    forwarder: Arc<dyn EventForwarder>,
}

impl EventSink {
    pub fn new(outbound: mpsc::Sender<StreamEvent>, forwarder: Arc<dyn EventForwarder>) -> Self {
        Self {
            outbound,
            forwarder,
        }
    }

    pub async fn emit(&self, event: StreamEvent) {
        self.forwarder.forward(&event);
        if self.outbound.send(event).await.is_err() {
            tracing::debug!("Outbound channel closed, dropping event");
        }
    }
}

/// Shared dependencies for all calls
pub struct Relay {
    store: Arc<ConversationStore>,
    llm: Arc<dyn LlmClient>,
    tools: Arc<dyn ToolExecutor>,
    forwarder: Arc<dyn EventForwarder>,
}

impl Relay {
    pub fn new(
        store: Arc<ConversationStore>,
        llm: Arc<dyn LlmClient>,
        tools: Arc<dyn ToolExecutor>,
        forwarder: Arc<dyn EventForwarder>,
    ) -> Self {
        Self {
            store,
            llm,
            tools,
            forwarder,
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Start a controller for a new connection; its events go to `outbound`
    pub fn spawn_call(&self, outbound: mpsc::Sender<StreamEvent>) -> ControllerHandle {
        let sink = EventSink::new(outbound, self.forwarder.clone());
        let (controller, handle) = SessionController::new(
            self.store.clone(),
            self.llm.clone(),
            self.tools.clone(),
            sink,
        );
        tokio::spawn(controller.run());
        handle
    }
}
