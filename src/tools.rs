//! Tools the model can invoke mid-reply
//!
//! Every tool returns text that is spoken to the caller verbatim, so a
//! failing tool never surfaces its error. The dispatcher swaps it for a
//! fixed fallback line.

mod calendar;
mod date;
mod joke;

pub use calendar::CalendarWebhookTool;
pub use date::TodaysDateTool;
pub use joke::ProgrammingJokeTool;

use crate::conversation::ToolCall;
use crate::llm::ToolDefinition;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Spoken in place of any tool failure
pub const TOOL_FALLBACK: &str = "Sorry, I couldn't do that right now.";

#[derive(Debug, Error)]
pub enum ToolExecutionError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Upstream service error: {0}")]
    Upstream(String),
}

/// Trait for tools that can be executed by the model
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &str;

    /// Tool description for LLM
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    async fn run(&self, input: Value) -> Result<String, ToolExecutionError>;
}

/// Collection of tools available to every call
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    /// Standard tool set. The calendar tool is only offered when a webhook is configured.
    pub fn standard(client: reqwest::Client, webhook_url: Option<String>) -> Self {
        let mut tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(ProgrammingJokeTool::new(client.clone())),
            Arc::new(TodaysDateTool),
        ];

        if let Some(url) = webhook_url {
            tools.push(Arc::new(CalendarWebhookTool::new(client, url)));
        }

        Self::new(tools)
    }

    /// Get all tool definitions for LLM
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Run a tool call and return the text to speak
    pub async fn dispatch(&self, call: &ToolCall) -> String {
        let Some(tool) = self.tools.iter().find(|t| t.name() == call.name) else {
            tracing::warn!(tool = %call.name, tool_call_id = %call.id, "Unknown tool requested");
            return TOOL_FALLBACK.to_string();
        };

        match tool.run(call.arguments.clone()).await {
            Ok(output) => {
                tracing::info!(tool = %call.name, tool_call_id = %call.id, "Tool completed");
                output
            }
            Err(e) => {
                tracing::warn!(
                    tool = %call.name,
                    tool_call_id = %call.id,
                    error = %e,
                    "Tool failed"
                );
                TOOL_FALLBACK.to_string()
            }
        }
    }
}
