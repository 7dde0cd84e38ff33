//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the interleaver and controller with mock
//! implementations.

use super::StreamEvent;
use crate::conversation::ToolCall;
use crate::llm::{ChunkStream, LlmError, LlmRequest, LlmService, ToolDefinition};
use crate::tools::ToolRegistry;
use async_trait::async_trait;
use std::sync::Arc;

/// Client for streaming LLM completions
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Open a completion stream
    async fn stream(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Executor for tools
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run a tool call; always yields text to speak
    async fn execute(&self, call: &ToolCall) -> String;

    /// Get tool definitions for LLM
    fn definitions(&self) -> Vec<ToolDefinition>;
}

/// Best-effort mirror of outbound events to a secondary consumer.
///
/// Must not block the caller.
pub trait EventForwarder: Send + Sync {
    fn forward(&self, event: &StreamEvent);
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for Arc<T> {
    async fn stream(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError> {
        (**self).stream(request).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

#[async_trait]
impl<T: ToolExecutor + ?Sized> ToolExecutor for Arc<T> {
    async fn execute(&self, call: &ToolCall) -> String {
        (**self).execute(call).await
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        (**self).definitions()
    }
}

impl<T: EventForwarder + ?Sized> EventForwarder for Arc<T> {
    fn forward(&self, event: &StreamEvent) {
        (**self).forward(event);
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use an `LlmService` as `LlmClient`
pub struct ServiceLlmClient {
    service: Arc<dyn LlmService>,
}

impl ServiceLlmClient {
    pub fn new(service: Arc<dyn LlmService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl LlmClient for ServiceLlmClient {
    async fn stream(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError> {
        self.service.stream(request).await
    }

    fn model_id(&self) -> &str {
        self.service.model_id()
    }
}

/// Adapter to use `ToolRegistry` as `ToolExecutor`
pub struct ToolRegistryExecutor {
    registry: ToolRegistry,
}

impl ToolRegistryExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistryExecutor {
    async fn execute(&self, call: &ToolCall) -> String {
        self.registry.dispatch(call).await
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }
}
