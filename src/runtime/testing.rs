//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use super::StreamEvent;
use crate::conversation::{Message, Role, ToolCall};
use crate::llm::{ChunkStream, CompletionChunk, LlmError, LlmRequest, ToolDefinition};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Mock LLM Client
// ============================================================================

/// Scripted reply for one completion request
pub enum Script {
    /// Yield these items, then end
    Chunks(Vec<Result<CompletionChunk, LlmError>>),
    /// Yield these items, then never end
    Stall(Vec<CompletionChunk>),
    /// Fail to open the stream
    OpenError(LlmError),
    /// Stream the last user message back as two fragments
    Echo,
}

/// Mock LLM client that plays queued scripts, echoing once the queue is empty
pub struct MockLlmClient {
    scripts: Mutex<VecDeque<Script>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
    delay: Duration,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Pause before every chunk
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn queue(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// Queue a plain text reply split into fragments
    pub fn queue_text(&self, fragments: &[&str]) {
        self.queue(Script::Chunks(
            fragments
                .iter()
                .map(|f| Ok(CompletionChunk::text(*f)))
                .collect(),
        ));
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn paced(&self, items: Vec<Result<CompletionChunk, LlmError>>) -> ChunkStream {
        let delay = self.delay;
        Box::pin(futures::stream::iter(items).then(move |item| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            item
        }))
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn stream(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or(Script::Echo);

        match script {
            Script::Chunks(items) => Ok(self.paced(items)),
            Script::Stall(chunks) => Ok(Box::pin(
                self.paced(chunks.into_iter().map(Ok).collect())
                    .chain(futures::stream::pending()),
            )),
            Script::OpenError(e) => Err(e),
            Script::Echo => {
                let said = request
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                Ok(self.paced(vec![
                    Ok(CompletionChunk::text("You said: ")),
                    Ok(CompletionChunk::text(said)),
                ]))
            }
        }
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// Mock Tool Executor
// ============================================================================

/// Mock tool executor with predefined outputs
pub struct MockToolExecutor {
    outputs: HashMap<String, String>,
    definitions: Vec<ToolDefinition>,
    delay: Duration,
    /// Record of tool executions
    pub executions: Mutex<Vec<ToolCall>>,
}

impl MockToolExecutor {
    pub fn new() -> Self {
        Self {
            outputs: HashMap::new(),
            definitions: Vec::new(),
            delay: Duration::ZERO,
            executions: Mutex::new(Vec::new()),
        }
    }

    /// Add a tool with a predefined output
    pub fn with_tool(mut self, name: impl Into<String>, output: impl Into<String>) -> Self {
        let name = name.into();
        self.definitions.push(ToolDefinition {
            name: name.clone(),
            description: format!("Mock {name}"),
            input_schema: serde_json::json!({"type": "object", "properties": {}, "required": [], "additionalProperties": false}),
        });
        self.outputs.insert(name, output.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn recorded_executions(&self) -> Vec<ToolCall> {
        self.executions.lock().unwrap().clone()
    }
}

impl Default for MockToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    async fn execute(&self, call: &ToolCall) -> String {
        self.executions.lock().unwrap().push(call.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outputs
            .get(&call.name)
            .cloned()
            .unwrap_or_else(|| crate::tools::TOOL_FALLBACK.to_string())
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }
}

// ============================================================================
// Recording Forwarder
// ============================================================================

#[derive(Default)]
pub struct RecordingForwarder {
    pub events: Mutex<Vec<StreamEvent>>,
}

impl RecordingForwarder {
    pub fn recorded(&self) -> Vec<StreamEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventForwarder for RecordingForwarder {
    fn forward(&self, event: &StreamEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Roles of a conversation, for order assertions
pub fn roles(messages: &[Message]) -> Vec<Role> {
    messages.iter().map(|m| m.role).collect()
}

// ============================================================================
// Integration Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{ConversationStore, Session};
    use crate::llm::LlmErrorKind;
    use crate::runtime::interleave::{run_turn, TurnError, TRANSPORT_FALLBACK};
    use crate::runtime::{ControllerHandle, EventSink, Relay};
    use crate::state_machine::CallEvent;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    const SYSTEM: &str = "You are a test assistant.";

    struct Harness {
        store: Arc<ConversationStore>,
        llm: Arc<MockLlmClient>,
        tools: Arc<MockToolExecutor>,
        forwarder: Arc<RecordingForwarder>,
    }

    impl Harness {
        fn new(llm: MockLlmClient, tools: MockToolExecutor) -> Self {
            Self {
                store: Arc::new(ConversationStore::new(SYSTEM)),
                llm: Arc::new(llm),
                tools: Arc::new(tools),
                forwarder: Arc::new(RecordingForwarder::default()),
            }
        }

        fn sink(&self) -> (EventSink, mpsc::Receiver<StreamEvent>) {
            let (tx, rx) = mpsc::channel(256);
            (EventSink::new(tx, self.forwarder.clone()), rx)
        }

        fn relay(&self) -> Relay {
            Relay::new(
                self.store.clone(),
                self.llm.clone(),
                self.tools.clone(),
                self.forwarder.clone(),
            )
        }

        async fn turn(&self, session: &Session, text: &str) -> (Result<(), TurnError>, Vec<StreamEvent>) {
            let (sink, mut rx) = self.sink();
            let result = run_turn(
                session,
                text,
                &self.llm,
                &self.tools,
                &sink,
                &CancellationToken::new(),
            )
            .await
            .map(|_| ());
            drop(sink);
            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            (result, events)
        }
    }

    fn tool_chunk(id: &str, name: &str) -> Result<CompletionChunk, LlmError> {
        Ok(CompletionChunk::tool_calls(vec![ToolCall::new(id, name, json!({}))]))
    }

    /// Collect events up to and including the next `last` marker
    async fn next_reply(rx: &mut mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for reply")
                .expect("outbound channel closed");
            let done = event.last && event.token.is_empty();
            events.push(event);
            if done {
                return events;
            }
        }
    }

    async fn wait_until_stopped(handle: &ControllerHandle) {
        for _ in 0..100 {
            if handle.is_closed() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("controller did not stop");
    }

    // ------------------------------------------------------------------------
    // Streaming interleaver
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_text_turn_streams_then_commits() {
        let llm = MockLlmClient::new();
        llm.queue_text(&["Hello", "", " there"]);
        let h = Harness::new(llm, MockToolExecutor::new());
        let session = h.store.create("CA1").await.unwrap();

        let (result, events) = h.turn(&session, "hi").await;

        assert!(result.is_ok());
        assert_eq!(
            events,
            vec![
                StreamEvent::token("Hello"),
                StreamEvent::token(" there"),
                StreamEvent::end()
            ]
        );
        let conv = session.conversation().await;
        assert_eq!(roles(conv.messages()), vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(conv.messages()[1].content, "hi");
        assert_eq!(conv.messages()[2].content, "Hello there");
    }

    #[tokio::test]
    async fn test_request_carries_full_history_and_tools() {
        let llm = MockLlmClient::new();
        llm.queue_text(&["first"]);
        llm.queue_text(&["second"]);
        let h = Harness::new(llm, MockToolExecutor::new().with_tool("get_todays_date", "2025-06-02"));
        let session = h.store.create("CA1").await.unwrap();

        h.turn(&session, "one").await;
        h.turn(&session, "two").await;

        let requests = h.llm.recorded_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            roles(&requests[1].messages),
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(requests[1].messages[0].content, SYSTEM);
        assert_eq!(requests[1].tools.len(), 1);
    }

    #[tokio::test]
    async fn test_tool_round_trip_ordering() {
        let llm = MockLlmClient::new();
        llm.queue(Script::Chunks(vec![
            Ok(CompletionChunk::text("Here is one. ")),
            tool_chunk("call_1", "get_programming_joke"),
            Ok(CompletionChunk::text(" Want another?")),
        ]));
        let tools = MockToolExecutor::new().with_tool("get_programming_joke", "A joke.");
        let h = Harness::new(llm, tools);
        let session = h.store.create("CA1").await.unwrap();

        let (result, events) = h.turn(&session, "joke please").await;

        assert!(result.is_ok());
        assert_eq!(
            events,
            vec![
                StreamEvent::token("Here is one. "),
                StreamEvent::last("A joke."),
                StreamEvent::token(" Want another?"),
                StreamEvent::end(),
            ]
        );

        let conv = session.conversation().await;
        assert!(conv.is_well_formed());
        assert_eq!(
            roles(conv.messages()),
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        let call = &conv.messages()[2];
        assert_eq!(call.tool_calls[0].id, "call_1");
        assert!(call.content.is_empty());
        assert_eq!(conv.messages()[3].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(conv.messages()[3].content, "A joke.");
        assert_eq!(conv.messages()[4].content, "Here is one. A joke. Want another?");
    }

    #[tokio::test]
    async fn test_repeated_tool_id_dispatched_once() {
        let llm = MockLlmClient::new();
        llm.queue(Script::Chunks(vec![
            tool_chunk("call_1", "get_programming_joke"),
            tool_chunk("call_1", "get_programming_joke"),
        ]));
        let tools = MockToolExecutor::new().with_tool("get_programming_joke", "A joke.");
        let h = Harness::new(llm, tools);
        let session = h.store.create("CA1").await.unwrap();

        let (_, events) = h.turn(&session, "joke").await;

        assert_eq!(h.tools.recorded_executions().len(), 1);
        assert_eq!(events, vec![StreamEvent::last("A joke."), StreamEvent::end()]);
        let conv = session.conversation().await;
        assert_eq!(conv.len(), 5);
    }

    #[tokio::test]
    async fn test_transport_failure_rolls_back() {
        let llm = MockLlmClient::new();
        llm.queue_text(&["ok"]);
        llm.queue(Script::Chunks(vec![
            Ok(CompletionChunk::text("Partial")),
            tool_chunk("call_1", "get_programming_joke"),
            Err(LlmError::stream("connection reset")),
        ]));
        let tools = MockToolExecutor::new().with_tool("get_programming_joke", "A joke.");
        let h = Harness::new(llm, tools);
        let session = h.store.create("CA1").await.unwrap();
        h.turn(&session, "first").await;
        let before = session.conversation().await.clone();

        let (result, events) = h.turn(&session, "second").await;

        assert!(matches!(result, Err(TurnError::Transport(_))));
        assert_eq!(events.last(), Some(&StreamEvent::last(TRANSPORT_FALLBACK)));
        assert!(events.iter().all(|e| !e.token.contains("connection reset")));
        assert_eq!(*session.conversation().await, before);
    }

    #[tokio::test]
    async fn test_open_failure_speaks_fallback() {
        let llm = MockLlmClient::new();
        llm.queue(Script::OpenError(LlmError::auth("bad key")));
        let h = Harness::new(llm, MockToolExecutor::new());
        let session = h.store.create("CA1").await.unwrap();

        let (result, events) = h.turn(&session, "hello").await;

        match result {
            Err(TurnError::Transport(e)) => assert_eq!(e.kind, LlmErrorKind::Auth),
            other => panic!("expected transport failure, got {other:?}"),
        }
        assert_eq!(events, vec![StreamEvent::last(TRANSPORT_FALLBACK)]);
        assert_eq!(session.conversation().await.len(), 1);
    }

    #[tokio::test]
    async fn test_destroyed_mid_stream_commits_nothing() {
        let llm = MockLlmClient::new();
        llm.queue(Script::Stall(vec![CompletionChunk::text("Still talking")]));
        let h = Harness::new(llm, MockToolExecutor::new());
        let session = h.store.create("CA1").await.unwrap();
        let (sink, mut rx) = h.sink();

        let turn = {
            let session = session.clone();
            let llm = h.llm.clone();
            let tools = h.tools.clone();
            tokio::spawn(async move {
                run_turn(&session, "hi", &llm, &tools, &sink, session.cancel_token()).await
            })
        };

        assert_eq!(rx.recv().await, Some(StreamEvent::token("Still talking")));
        h.store.destroy("CA1").await;

        let result = tokio::time::timeout(Duration::from_secs(5), turn)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(TurnError::Cancelled)));
        assert_eq!(rx.recv().await, None);
        assert_eq!(
            roles(session.conversation().await.messages()),
            vec![Role::System, Role::User]
        );
    }

    #[tokio::test]
    async fn test_cancel_during_tool_call() {
        let llm = MockLlmClient::new();
        llm.queue(Script::Chunks(vec![tool_chunk("call_1", "slow_tool")]));
        let tools = MockToolExecutor::new()
            .with_tool("slow_tool", "done")
            .with_delay(Duration::from_secs(30));
        let h = Harness::new(llm, tools);
        let session = h.store.create("CA1").await.unwrap();
        let (sink, _rx) = h.sink();
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            })
        };
        let result = run_turn(&session, "go", &h.llm, &h.tools, &sink, &cancel).await;
        canceller.await.unwrap();

        assert!(matches!(result, Err(TurnError::Cancelled)));
        assert_eq!(session.conversation().await.len(), 2);
    }

    #[tokio::test]
    async fn test_every_event_is_forwarded() {
        let llm = MockLlmClient::new();
        llm.queue(Script::Chunks(vec![
            Ok(CompletionChunk::text("a")),
            tool_chunk("call_1", "get_todays_date"),
        ]));
        let h = Harness::new(llm, MockToolExecutor::new().with_tool("get_todays_date", "2025-06-02"));
        let session = h.store.create("CA1").await.unwrap();

        let (_, events) = h.turn(&session, "date").await;

        assert_eq!(h.forwarder.recorded(), events);
    }

    #[tokio::test]
    async fn test_message_order_over_many_turns() {
        let llm = MockLlmClient::new();
        for turn in 0..6 {
            let mut items = vec![Ok(CompletionChunk::text("Sure. "))];
            for call in 0..(turn % 3) {
                items.push(tool_chunk(&format!("call_{turn}_{call}"), "get_todays_date"));
            }
            items.push(Ok(CompletionChunk::text("Done.")));
            llm.queue(Script::Chunks(items));
        }
        let h = Harness::new(llm, MockToolExecutor::new().with_tool("get_todays_date", "2025-06-02"));
        let session = h.store.create("CA1").await.unwrap();

        for turn in 0..6 {
            h.turn(&session, &format!("turn {turn}")).await;
        }

        let conv = session.conversation().await;
        assert!(conv.is_well_formed());
        let messages = conv.messages();
        assert_eq!(messages[0].role, Role::System);

        // Per turn: user, (assistant tool call, tool)*, assistant
        let mut i = 1;
        for turn in 0..6 {
            assert_eq!(messages[i].role, Role::User);
            assert_eq!(messages[i].content, format!("turn {turn}"));
            i += 1;
            for _ in 0..(turn % 3) {
                assert!(messages[i].has_tool_calls());
                assert_eq!(messages[i + 1].role, Role::Tool);
                assert_eq!(
                    messages[i + 1].tool_call_id.as_deref(),
                    Some(messages[i].tool_calls[0].id.as_str())
                );
                i += 2;
            }
            assert_eq!(messages[i].role, Role::Assistant);
            assert!(!messages[i].has_tool_calls());
            i += 1;
        }
        assert_eq!(i, messages.len());
    }

    // ------------------------------------------------------------------------
    // Session controller
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_controller_full_call() {
        let llm = MockLlmClient::new();
        llm.queue_text(&["Great, I will set up", " a coffee chat on Tuesday at three"]);
        let h = Harness::new(llm, MockToolExecutor::new());
        let relay = h.relay();
        let (tx, mut rx) = mpsc::channel(64);
        let handle = relay.spawn_call(tx);

        handle.send(CallEvent::Setup { call_sid: "CA1".to_string() }).await;
        handle.send(CallEvent::Prompt { text: "coffee chat tuesday".to_string() }).await;
        let reply = next_reply(&mut rx).await;
        assert_eq!(reply.len(), 3);

        handle
            .send(CallEvent::Interrupt { heard: "Great, I will set up".to_string() })
            .await;
        // Interrupt is applied before the next event is processed
        handle.send(CallEvent::Prompt { text: "actually wednesday".to_string() }).await;
        next_reply(&mut rx).await;

        let requests = h.llm.recorded_requests();
        assert_eq!(requests[1].messages[2].content, "Great, I will set up");

        handle.hangup().await;
        wait_until_stopped(&handle).await;
        assert!(h.store.get("CA1").await.is_err());
    }

    #[tokio::test]
    async fn test_interrupt_during_stream_applies_to_committed_reply() {
        let llm = MockLlmClient::new().with_delay(Duration::from_millis(50));
        llm.queue_text(&["Great, I will set up", " a coffee chat", " on Tuesday at three"]);
        let h = Harness::new(llm, MockToolExecutor::new());
        let relay = h.relay();
        let (tx, mut rx) = mpsc::channel(64);
        let handle = relay.spawn_call(tx);

        handle.send(CallEvent::Setup { call_sid: "CA1".to_string() }).await;
        handle.send(CallEvent::Prompt { text: "coffee chat tuesday".to_string() }).await;
        assert_eq!(rx.recv().await, Some(StreamEvent::token("Great, I will set up")));

        // Still streaming; the interrupt queues behind the running turn
        handle
            .send(CallEvent::Interrupt { heard: "Great, I will set up".to_string() })
            .await;
        assert!(rx.try_recv().is_err());

        let rest = next_reply(&mut rx).await;
        assert_eq!(
            rest,
            vec![
                StreamEvent::token(" a coffee chat"),
                StreamEvent::token(" on Tuesday at three"),
                StreamEvent::end()
            ]
        );

        handle.send(CallEvent::Prompt { text: "make it wednesday".to_string() }).await;
        next_reply(&mut rx).await;

        let requests = h.llm.recorded_requests();
        let history = &requests[1].messages;
        assert_eq!(
            roles(history),
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(history[2].content, "Great, I will set up");
        assert_eq!(history[3].content, "make it wednesday");
    }

    #[tokio::test]
    async fn test_prompt_before_setup_is_ignored() {
        let h = Harness::new(MockLlmClient::new(), MockToolExecutor::new());
        let relay = h.relay();
        let (tx, mut rx) = mpsc::channel(64);
        let handle = relay.spawn_call(tx);

        handle.send(CallEvent::Prompt { text: "hello?".to_string() }).await;
        handle.send(CallEvent::Setup { call_sid: "CA1".to_string() }).await;
        handle.send(CallEvent::Prompt { text: "hello".to_string() }).await;

        let reply = next_reply(&mut rx).await;
        assert_eq!(reply[1], StreamEvent::token("hello"));
        assert_eq!(h.llm.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_teardown_then_prompt_is_noop() {
        let h = Harness::new(MockLlmClient::new(), MockToolExecutor::new());
        let relay = h.relay();
        let (tx, _rx) = mpsc::channel(64);
        let handle = relay.spawn_call(tx);

        handle.send(CallEvent::Setup { call_sid: "CA1".to_string() }).await;
        handle.send(CallEvent::Disconnect).await;
        wait_until_stopped(&handle).await;

        assert!(!handle.send(CallEvent::Prompt { text: "still there?".to_string() }).await);
        assert!(h.store.get("CA1").await.is_err());
        assert!(h.llm.recorded_requests().is_empty());
    }

    #[tokio::test]
    async fn test_hangup_abandons_running_turn() {
        let llm = MockLlmClient::new();
        llm.queue(Script::Stall(vec![CompletionChunk::text("Let me think")]));
        let h = Harness::new(llm, MockToolExecutor::new());
        let relay = h.relay();
        let (tx, mut rx) = mpsc::channel(64);
        let handle = relay.spawn_call(tx);

        handle.send(CallEvent::Setup { call_sid: "CA1".to_string() }).await;
        handle.send(CallEvent::Prompt { text: "hmm".to_string() }).await;
        assert_eq!(rx.recv().await, Some(StreamEvent::token("Let me think")));

        handle.hangup().await;
        wait_until_stopped(&handle).await;

        assert_eq!(h.store.len().await, 0);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_repeated_setup_starts_fresh_history() {
        let h = Harness::new(MockLlmClient::new(), MockToolExecutor::new());
        let relay = h.relay();
        let (tx, mut rx) = mpsc::channel(64);
        let handle = relay.spawn_call(tx);

        handle.send(CallEvent::Setup { call_sid: "CA1".to_string() }).await;
        handle.send(CallEvent::Prompt { text: "one".to_string() }).await;
        next_reply(&mut rx).await;
        handle.send(CallEvent::Setup { call_sid: "CA1".to_string() }).await;
        handle.send(CallEvent::Prompt { text: "two".to_string() }).await;
        next_reply(&mut rx).await;

        let requests = h.llm.recorded_requests();
        assert_eq!(roles(&requests[1].messages), vec![Role::System, Role::User]);
        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_sessions_are_isolated() {
        const CALLS: usize = 12;
        let h = Harness::new(
            MockLlmClient::new().with_delay(Duration::from_millis(5)),
            MockToolExecutor::new(),
        );
        let relay = Arc::new(h.relay());

        let mut tasks = Vec::new();
        for n in 0..CALLS {
            let relay = relay.clone();
            tasks.push(tokio::spawn(async move {
                let (tx, mut rx) = mpsc::channel(64);
                let handle = relay.spawn_call(tx);
                let call_sid = format!("CA{n}");
                handle.send(CallEvent::Setup { call_sid: call_sid.clone() }).await;
                for turn in 0..3 {
                    handle
                        .send(CallEvent::Prompt { text: format!("{call_sid} turn {turn}") })
                        .await;
                    let reply = next_reply(&mut rx).await;
                    assert_eq!(reply[1].token, format!("{call_sid} turn {turn}"));
                }
                (call_sid, handle)
            }));
        }

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }
        assert_eq!(h.store.len().await, CALLS);

        for (call_sid, _) in &handles {
            let session = h.store.get(call_sid).await.unwrap();
            let conv = session.conversation().await;
            assert_eq!(conv.len(), 7);
            for message in conv.messages().iter().filter(|m| m.role == Role::User) {
                assert!(message.content.starts_with(&format!("{call_sid} ")));
            }
        }

        for (_, handle) in &handles {
            handle.hangup().await;
            wait_until_stopped(handle).await;
        }
        assert_eq!(h.store.len().await, 0);
    }
}
