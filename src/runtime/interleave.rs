//! One completion cycle per caller utterance
//!
//! Text fragments are relayed the moment they arrive; tool calls are run in
//! line and their results spoken as they complete. The conversation only
//! changes twice: the user message goes in up front, and the finished turn
//! is committed in one piece at the end. A failed turn is rolled back.

use super::traits::{LlmClient, ToolExecutor};
use super::{EventSink, StreamEvent};
use crate::conversation::{Message, Session};
use crate::llm::{LlmError, LlmRequest};
use futures::StreamExt;
use std::collections::HashSet;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Spoken when the model stream fails
pub const TRANSPORT_FALLBACK: &str = "Sorry, I'm having trouble right now. Please try again.";

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("Model stream failed: {0}")]
    Transport(#[from] LlmError),
    #[error("Turn cancelled")]
    Cancelled,
    #[error("Session no longer live")]
    SessionGone,
}

/// Summary of a committed turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub fragments: usize,
    pub tool_calls: usize,
    pub reply: String,
}

/// Work of one turn held back until the stream ends
#[derive(Default)]
struct PendingTurn {
    /// Tool call and tool result pairs, in dispatch order
    staged: Vec<Message>,
    transcript: String,
    dispatched: HashSet<String>,
    fragments: usize,
}

/// Run one turn for `session`.
///
/// Every await is raced against `cancel`; once it fires the turn emits
/// nothing more and commits nothing.
pub async fn run_turn<L, T>(
    session: &Session,
    text: &str,
    llm: &L,
    tools: &T,
    sink: &EventSink,
    cancel: &CancellationToken,
) -> Result<TurnOutcome, TurnError>
where
    L: LlmClient + ?Sized,
    T: ToolExecutor + ?Sized,
{
    let (mark, request) = {
        let mut conversation = session.conversation().await;
        if !session.is_live() {
            return Err(TurnError::SessionGone);
        }
        let mark = conversation.mark();
        conversation.push(Message::user(text));
        let request = LlmRequest {
            messages: conversation.messages().to_vec(),
            tools: tools.definitions(),
        };
        (mark, request)
    };

    let pending = match stream_reply(&request, llm, tools, sink, cancel).await {
        Ok(pending) => pending,
        Err(TurnError::Transport(e)) => {
            let mut conversation = session.conversation().await;
            if session.is_live() {
                conversation.rollback(mark);
            }
            drop(conversation);
            tracing::warn!(
                call_sid = %session.call_sid(),
                kind = ?e.kind,
                error = %e,
                "Turn failed, history rolled back"
            );
            sink.emit(StreamEvent::last(TRANSPORT_FALLBACK)).await;
            return Err(TurnError::Transport(e));
        }
        Err(e) => return Err(e),
    };

    let outcome = TurnOutcome {
        fragments: pending.fragments,
        tool_calls: pending.staged.len() / 2,
        reply: pending.transcript.clone(),
    };

    let history_len = {
        let mut conversation = session.conversation().await;
        if !session.is_live() || cancel.is_cancelled() {
            return Err(TurnError::SessionGone);
        }
        conversation.extend(pending.staged);
        conversation.push(Message::assistant(pending.transcript));
        debug_assert!(conversation.is_well_formed());
        conversation.len()
    };

    sink.emit(StreamEvent::end()).await;

    tracing::info!(
        call_sid = %session.call_sid(),
        fragments = outcome.fragments,
        tool_calls = outcome.tool_calls,
        history_len,
        "Turn committed"
    );
    Ok(outcome)
}

async fn stream_reply<L, T>(
    request: &LlmRequest,
    llm: &L,
    tools: &T,
    sink: &EventSink,
    cancel: &CancellationToken,
) -> Result<PendingTurn, TurnError>
where
    L: LlmClient + ?Sized,
    T: ToolExecutor + ?Sized,
{
    let mut stream = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(TurnError::Cancelled),
        opened = llm.stream(request) => opened?,
    };

    let mut pending = PendingTurn::default();

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(TurnError::Cancelled),
            next = stream.next() => next,
        };
        let Some(chunk) = next else { break };
        let chunk = chunk?;

        for call in &chunk.tool_calls {
            if !pending.dispatched.insert(call.id.clone()) {
                tracing::debug!(tool_call_id = %call.id, "Skipping repeated tool call");
                continue;
            }

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(TurnError::Cancelled),
                result = tools.execute(call) => result,
            };

            pending.staged.push(Message::assistant_tool_call(call.clone()));
            pending.staged.push(Message::tool(call.id.clone(), result.clone()));
            pending.transcript.push_str(&result);
            sink.emit(StreamEvent::last(result)).await;
        }

        if let Some(fragment) = chunk.fragment() {
            pending.transcript.push_str(fragment);
            pending.fragments += 1;
            sink.emit(StreamEvent::token(fragment)).await;
        }
    }

    Ok(pending)
}
