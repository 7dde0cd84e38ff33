//! Common types for streamed completions

use super::LlmError;
use crate::conversation::{Message, ToolCall};
use futures::Stream;
use std::pin::Pin;

/// Stream of chunks for a single completion
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<CompletionChunk, LlmError>> + Send>>;

/// LLM request
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Full history, system message first
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
}

/// Tool definition advertised to the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// One increment of a streamed completion.
///
/// Text fragments and completed tool calls can arrive in any order;
/// a single chunk may carry either, both, or neither.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionChunk {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl CompletionChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls,
        }
    }

    /// Content fragment if present and non-empty
    pub fn fragment(&self) -> Option<&str> {
        self.content.as_deref().filter(|s| !s.is_empty())
    }
}
