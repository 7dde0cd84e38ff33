//! Process-wide registry of live call sessions
//!
//! The map lock is only held for lookups and inserts. Each session guards
//! its own conversation, so turns on different calls never contend.

use super::Conversation;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("No live session for call {0}")]
    UnknownSession(String),
    #[error("Session already active for call {0}")]
    DuplicateSession(String),
}

/// One caller's live state
#[derive(Debug)]
pub struct Session {
    call_sid: String,
    conversation: Mutex<Conversation>,
    /// Cancelled when the session is destroyed or replaced
    cancel: CancellationToken,
}

impl Session {
    fn new(call_sid: &str, system_prompt: &str) -> Self {
        Self {
            call_sid: call_sid.to_string(),
            conversation: Mutex::new(Conversation::new(system_prompt)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn call_sid(&self) -> &str {
        &self.call_sid
    }

    /// Exclusive access to the conversation
    pub async fn conversation(&self) -> MutexGuard<'_, Conversation> {
        self.conversation.lock().await
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// False once the session has been torn down; late writers must check this
    pub fn is_live(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

/// Registry mapping call identifiers to sessions
pub struct ConversationStore {
    system_prompt: String,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl ConversationStore {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a fresh session seeded with the system message
    pub async fn create(&self, call_sid: &str) -> Result<Arc<Session>, StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(call_sid) {
            return Err(StoreError::DuplicateSession(call_sid.to_string()));
        }
        let session = Arc::new(Session::new(call_sid, &self.system_prompt));
        sessions.insert(call_sid.to_string(), session.clone());
        Ok(session)
    }

    /// Create a fresh session, discarding any existing one for the same call
    pub async fn replace(&self, call_sid: &str) -> Arc<Session> {
        let session = Arc::new(Session::new(call_sid, &self.system_prompt));
        let previous = self
            .sessions
            .write()
            .await
            .insert(call_sid.to_string(), session.clone());
        if let Some(previous) = previous {
            previous.cancel.cancel();
            tracing::warn!(call_sid = %call_sid, "Replaced existing session");
        }
        session
    }

    #[allow(dead_code)] // Calls hold their own session; lookup is for tests and diagnostics
    pub async fn get(&self, call_sid: &str) -> Result<Arc<Session>, StoreError> {
        self.sessions
            .read()
            .await
            .get(call_sid)
            .cloned()
            .ok_or_else(|| StoreError::UnknownSession(call_sid.to_string()))
    }

    /// Remove a session and cancel anything still running for it.
    ///
    /// Returns whether a session was removed.
    #[allow(dead_code)] // Controllers tear down through release
    pub async fn destroy(&self, call_sid: &str) -> bool {
        let removed = self.sessions.write().await.remove(call_sid);
        match removed {
            Some(session) => {
                session.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Tear down `session`, unregistering it only if it is still the one
    /// registered for its call. A session replaced by another connection
    /// leaves its successor in place.
    pub async fn release(&self, session: &Arc<Session>) -> bool {
        session.cancel.cancel();
        let mut sessions = self.sessions.write().await;
        match sessions.get(session.call_sid()) {
            Some(current) if Arc::ptr_eq(current, session) => {
                sessions.remove(session.call_sid());
                true
            }
            _ => false,
        }
    }

    #[allow(dead_code)]
    pub async fn contains(&self, call_sid: &str) -> bool {
        self.sessions.read().await.contains_key(call_sid)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
