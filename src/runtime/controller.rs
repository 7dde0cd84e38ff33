//! Per-call actor
//!
//! Receives decoded caller events over a channel, runs them through the pure
//! transition function and executes the resulting effects in order. At most
//! one turn per call is therefore ever in flight.

use super::interleave::{run_turn, TurnError};
use super::traits::{LlmClient, ToolExecutor};
use super::EventSink;
use crate::conversation::{ConversationStore, Session, StoreError};
use crate::interrupt::handle_interrupt;
use crate::state_machine::{transition, CallEvent, CallState, Effect, IgnoreReason};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const EVENT_BUFFER: usize = 32;

/// Sending side of a controller
#[derive(Clone)]
pub struct ControllerHandle {
    events: mpsc::Sender<CallEvent>,
    hangup: CancellationToken,
}

impl ControllerHandle {
    /// Queue an event; false once the controller has stopped
    pub async fn send(&self, event: CallEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Connection closed: abandon any running turn, then tear down
    pub async fn hangup(&self) {
        self.hangup.cancel();
        let _ = self.events.send(CallEvent::Disconnect).await;
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

pub struct SessionController {
    state: CallState,
    /// Session this connection owns
    session: Option<Arc<Session>>,
    store: Arc<ConversationStore>,
    llm: Arc<dyn LlmClient>,
    tools: Arc<dyn ToolExecutor>,
    sink: EventSink,
    events: mpsc::Receiver<CallEvent>,
    hangup: CancellationToken,
}

impl SessionController {
    pub fn new(
        store: Arc<ConversationStore>,
        llm: Arc<dyn LlmClient>,
        tools: Arc<dyn ToolExecutor>,
        sink: EventSink,
    ) -> (Self, ControllerHandle) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let hangup = CancellationToken::new();
        let controller = Self {
            state: CallState::Idle,
            session: None,
            store,
            llm,
            tools,
            sink,
            events: rx,
            hangup: hangup.clone(),
        };
        (controller, ControllerHandle { events: tx, hangup })
    }

    pub async fn run(mut self) {
        tracing::debug!("Starting session controller");

        while let Some(event) = self.events.recv().await {
            let event_name = event.name().to_string();
            let result = transition(&self.state, event);

            if result.new_state != self.state {
                tracing::debug!(
                    event = %event_name,
                    from = self.state.name(),
                    to = result.new_state.name(),
                    "Call state changed"
                );
            }
            self.state = result.new_state;

            for effect in result.effects {
                self.execute_effect(effect).await;
            }

            if self.state.is_terminal() {
                break;
            }
        }

        // Channel dropped without a disconnect
        if let Some(session) = self.session.take() {
            self.store.release(&session).await;
        }

        tracing::debug!("Session controller stopped");
    }

    async fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::CreateSession { call_sid } => {
                let session = match self.store.create(&call_sid).await {
                    Ok(session) => session,
                    Err(e) => {
                        tracing::warn!(call_sid = %call_sid, error = %e, "Setup for a call that already has a session");
                        self.store.replace(&call_sid).await
                    }
                };
                tracing::info!(call_sid = %call_sid, "Session created");
                self.session = Some(session);
            }

            Effect::ReplaceSession { previous, call_sid } => {
                if let Some(old) = self.session.take() {
                    self.store.release(&old).await;
                }
                tracing::warn!(
                    call_sid = %call_sid,
                    previous = %previous,
                    error = %StoreError::DuplicateSession(previous.clone()),
                    "Repeated setup, replacing session"
                );
                self.session = Some(self.store.replace(&call_sid).await);
            }

            Effect::RunTurn { call_sid, text } => {
                let Some(session) = self.live_session(&call_sid) else {
                    return;
                };
                tracing::info!(
                    call_sid = %call_sid,
                    model = %self.llm.model_id(),
                    prompt = %text,
                    "Caller prompt"
                );

                tokio::select! {
                    result = run_turn(
                        &session,
                        &text,
                        &self.llm,
                        &self.tools,
                        &self.sink,
                        session.cancel_token(),
                    ) => match result {
                        Ok(outcome) => {
                            tracing::debug!(call_sid = %call_sid, reply = %outcome.reply, "Assistant reply");
                        }
                        Err(TurnError::Transport(_)) => {}
                        Err(e) => tracing::info!(call_sid = %call_sid, reason = %e, "Turn abandoned"),
                    },
                    () = self.hangup.cancelled() => {
                        tracing::info!(call_sid = %call_sid, "Turn abandoned on hangup");
                    }
                }
            }

            Effect::Truncate { call_sid, heard } => {
                let Some(session) = self.live_session(&call_sid) else {
                    return;
                };
                if let Err(e) = handle_interrupt(&session, &heard).await {
                    tracing::warn!(call_sid = %call_sid, error = %e, "Interrupt dropped");
                }
            }

            Effect::DestroySession { call_sid } => {
                if let Some(session) = self.session.take() {
                    self.store.release(&session).await;
                }
                tracing::info!(call_sid = %call_sid, "Session destroyed");
            }

            Effect::Ignore { reason } => match reason {
                IgnoreReason::NoSession => {
                    tracing::warn!("Event before setup ignored");
                }
                IgnoreReason::Terminated => {
                    tracing::debug!("Event after disconnect ignored");
                }
                IgnoreReason::UnknownEvent(kind) => {
                    tracing::warn!(kind = %kind, "Unhandled message type");
                }
            },
        }
    }

    /// This connection's session if it is still the live one for `call_sid`
    fn live_session(&self, call_sid: &str) -> Option<Arc<Session>> {
        match &self.session {
            Some(session) if session.is_live() => Some(session.clone()),
            _ => {
                tracing::warn!(
                    call_sid = %call_sid,
                    error = %StoreError::UnknownSession(call_sid.to_string()),
                    "No live session for event"
                );
                None
            }
        }
    }
}
