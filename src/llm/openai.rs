//! `OpenAI`-compatible streaming chat completions

use super::types::{ChunkStream, CompletionChunk, LlmRequest};
use super::{LlmError, LlmService};
use crate::conversation::{Message, Role, ToolCall};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;
use std::time::Duration;

/// Longest gap tolerated between two stream events
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Raw `data:` payloads of the event stream
type DataStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// OpenAI-compatible service implementation
pub struct OpenAIService {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
    /// Reply length cap sent with every request
    max_tokens: Option<u32>,
}

impl OpenAIService {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: &str,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            max_tokens: None,
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn translate_request(&self, request: &LlmRequest) -> OpenAIRequest {
        let messages = request.messages.iter().map(Self::translate_message).collect();

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| OpenAITool {
                        r#type: "function".to_string(),
                        function: OpenAIFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.input_schema.clone(),
                            strict: true,
                        },
                    })
                    .collect(),
            )
        };

        OpenAIRequest {
            model: self.model.clone(),
            messages,
            tools,
            max_tokens: self.max_tokens,
            stream: true,
        }
    }

    fn translate_message(msg: &Message) -> OpenAIMessage {
        let tool_calls = if msg.has_tool_calls() {
            Some(
                msg.tool_calls
                    .iter()
                    .map(|call| OpenAIToolCall {
                        id: call.id.clone(),
                        r#type: "function".to_string(),
                        function: OpenAIFunctionCall {
                            name: call.name.clone(),
                            arguments: serde_json::to_string(&call.arguments)
                                .unwrap_or_else(|_| "{}".to_string()),
                        },
                    })
                    .collect(),
            )
        } else {
            None
        };

        // Tool-call-only assistant turns carry no content field
        let content = if msg.role == Role::Assistant && msg.content.is_empty() && tool_calls.is_some()
        {
            None
        } else {
            Some(msg.content.clone())
        };

        OpenAIMessage {
            role: msg.role.as_str().to_string(),
            content,
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

#[async_trait]
impl LlmService for OpenAIService {
    async fn stream(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError> {
        let openai_request = self.translate_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("Accept", "text/event-stream")
            .json(&openai_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;
            let message = serde_json::from_str::<OpenAIErrorResponse>(&body)
                .map_or(body, |resp| resp.error.message);
            return Err(LlmError::from_status(status.as_u16(), &message));
        }

        let events = response
            .bytes_stream()
            .eventsource()
            .map(|event| match event {
                Ok(event) => Ok(event.data),
                Err(e) => Err(LlmError::stream(format!("SSE stream error: {e}"))),
            });

        Ok(decode_stream(Box::pin(events)))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Turn raw SSE payloads into completion chunks
fn decode_stream(events: DataStream) -> ChunkStream {
    let decoder = SseDecoder::new(events);
    Box::pin(futures::stream::unfold(decoder, |mut decoder| async move {
        decoder.next_chunk().await.map(|item| (item, decoder))
    }))
}

/// Partial tool call assembled across deltas
#[derive(Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn finish(self) -> Option<ToolCall> {
        if self.name.is_empty() {
            return None;
        }
        let arguments = if self.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&self.arguments).unwrap_or_else(|e| {
                tracing::warn!(error = %e, tool = %self.name, "Failed to parse tool call arguments");
                serde_json::json!({})
            })
        };
        Some(ToolCall::new(self.id, self.name, arguments))
    }
}

struct SseDecoder {
    events: DataStream,
    /// Keyed by the tool call index the provider assigns
    tool_calls: BTreeMap<u32, ToolCallAccumulator>,
    pending: VecDeque<CompletionChunk>,
    /// A finish reason was seen
    finished: bool,
    done: bool,
}

impl SseDecoder {
    fn new(events: DataStream) -> Self {
        Self {
            events,
            tool_calls: BTreeMap::new(),
            pending: VecDeque::new(),
            finished: false,
            done: false,
        }
    }

    async fn next_chunk(&mut self) -> Option<Result<CompletionChunk, LlmError>> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Some(Ok(chunk));
            }
            if self.done {
                return None;
            }

            let next = match tokio::time::timeout(IDLE_TIMEOUT, self.events.next()).await {
                Ok(next) => next,
                Err(_) => {
                    self.done = true;
                    return Some(Err(LlmError::stream(format!(
                        "SSE stream idle for {}s",
                        IDLE_TIMEOUT.as_secs()
                    ))));
                }
            };

            match next {
                Some(Ok(data)) if data == "[DONE]" => {
                    self.done = true;
                    self.flush_tool_calls();
                }
                Some(Ok(data)) => {
                    if let Err(e) = self.ingest(&data) {
                        self.done = true;
                        return Some(Err(e));
                    }
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    if !self.finished {
                        return Some(Err(LlmError::stream(
                            "SSE stream closed before response completed",
                        )));
                    }
                    self.flush_tool_calls();
                }
            }
        }
    }

    fn ingest(&mut self, data: &str) -> Result<(), LlmError> {
        let payload: StreamPayload = serde_json::from_str(data)
            .map_err(|e| LlmError::stream(format!("SSE parsing error: {e}, data: {data}")))?;

        if let Some(error) = payload.error {
            return Err(LlmError::stream(format!("SSE API error: {}", error.message)));
        }

        for choice in payload.choices {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                // Text after a tool call means its arguments are complete
                self.flush_tool_calls();
                self.pending.push_back(CompletionChunk::text(text));
            }

            for delta in choice.delta.tool_calls.unwrap_or_default() {
                self.flush_tool_calls_below(delta.index);
                let acc = self.tool_calls.entry(delta.index).or_default();
                if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
                    acc.id = id;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name.filter(|n| !n.is_empty()) {
                        acc.name = name;
                    }
                    if let Some(arguments) = function.arguments {
                        acc.arguments.push_str(&arguments);
                    }
                }
            }

            if choice.finish_reason.is_some() {
                self.finished = true;
                self.flush_tool_calls();
            }
        }

        Ok(())
    }

    fn flush_tool_calls(&mut self) {
        let complete = std::mem::take(&mut self.tool_calls);
        self.queue_tool_calls(complete);
    }

    /// A call is complete once a later index starts
    fn flush_tool_calls_below(&mut self, index: u32) {
        let open = self.tool_calls.split_off(&index);
        let complete = std::mem::replace(&mut self.tool_calls, open);
        self.queue_tool_calls(complete);
    }

    fn queue_tool_calls(&mut self, complete: BTreeMap<u32, ToolCallAccumulator>) {
        let calls: Vec<ToolCall> = complete
            .into_values()
            .filter_map(ToolCallAccumulator::finish)
            .collect();
        if !calls.is_empty() {
            self.pending.push_back(CompletionChunk::tool_calls(calls));
        }
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
    strict: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCall {
    id: String,
    r#type: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct StreamPayload {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<OpenAIError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: u32,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}
