//! Streaming chat completion client
//!
//! The relay speaks to one OpenAI-compatible endpoint. Responses arrive as a
//! stream of `CompletionChunk`s so text can be spoken while the model is
//! still generating.

mod error;
mod openai;
mod types;

#[allow(unused_imports)] // Kind is matched on by tests
pub use error::{LlmError, LlmErrorKind};
pub use openai::OpenAIService;
pub use types::{ChunkStream, CompletionChunk, LlmRequest, ToolDefinition};

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;

/// Common interface for streaming completion providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Open a completion stream for the request
    async fn stream(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Logging wrapper for LLM services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn stream(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError> {
        let start = Instant::now();
        let result = self.inner.stream(request).await;

        match result {
            Ok(stream) => {
                tracing::info!(
                    model = %self.model_id,
                    messages = request.messages.len(),
                    open_ms = %start.elapsed().as_millis(),
                    "LLM stream opened"
                );
                let model_id = self.model_id.clone();
                Ok(Box::pin(stream.inspect(move |item| {
                    if let Err(e) = item {
                        tracing::error!(
                            model = %model_id,
                            duration_ms = %start.elapsed().as_millis(),
                            error = %e.message,
                            "LLM stream failed"
                        );
                    }
                })))
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %start.elapsed().as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "LLM request failed"
                );
                Err(e)
            }
        }
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
