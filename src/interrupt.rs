//! Interrupt handling
//!
//! When the caller talks over the assistant, the telephony side reports the
//! text the caller actually heard. The stored history is cut back to that
//! point so later turns never treat unheard speech as said.

use crate::conversation::{Conversation, Role, Session, StoreError};
use std::collections::HashSet;

/// What an interrupt did to the conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterruptOutcome {
    /// Assistant message at `index` was cut; `removed` later messages dropped
    Truncated { index: usize, removed: usize },
    /// No assistant message contains the heard text
    NoMatch,
}

/// Cut the conversation at the end of `heard`.
///
/// The most recent assistant message containing `heard` is truncated right
/// after the first occurrence of it. Every assistant message after it is
/// removed, along with tool results answering calls made by those messages.
pub fn truncate_at_heard(conversation: &mut Conversation, heard: &str) -> InterruptOutcome {
    if heard.is_empty() {
        return InterruptOutcome::NoMatch;
    }

    let messages = conversation.messages_mut();

    let found = messages.iter().enumerate().rev().find_map(|(index, message)| {
        if !message.is_assistant() {
            return None;
        }
        message
            .content
            .find(heard)
            .map(|position| (index, position + heard.len()))
    });

    let Some((index, heard_end)) = found else {
        return InterruptOutcome::NoMatch;
    };

    messages[index].content.truncate(heard_end);

    let tail = messages.split_off(index + 1);
    let before = tail.len();

    let dropped_calls: HashSet<String> = tail
        .iter()
        .filter(|m| m.is_assistant())
        .flat_map(|m| m.tool_calls.iter().map(|c| c.id.clone()))
        .collect();

    messages.extend(tail.into_iter().filter(|m| match m.role {
        Role::Assistant => false,
        Role::Tool => !matches!(&m.tool_call_id, Some(id) if dropped_calls.contains(id)),
        Role::System | Role::User => true,
    }));

    let removed = before - (messages.len() - index - 1);
    InterruptOutcome::Truncated { index, removed }
}

/// Apply an interrupt to a live session
pub async fn handle_interrupt(
    session: &Session,
    heard: &str,
) -> Result<InterruptOutcome, StoreError> {
    let mut conversation = session.conversation().await;
    if !session.is_live() {
        return Err(StoreError::UnknownSession(session.call_sid().to_string()));
    }
    let outcome = truncate_at_heard(&mut conversation, heard);

    match &outcome {
        InterruptOutcome::Truncated { index, removed } => {
            tracing::info!(
                call_sid = %session.call_sid(),
                index = index,
                removed = removed,
                "Truncated conversation at interrupt"
            );
        }
        InterruptOutcome::NoMatch => {
            tracing::debug!(call_sid = %session.call_sid(), "Interrupt matched no assistant message");
        }
    }

    Ok(outcome)
}
