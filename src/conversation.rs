//! Per-call conversation history and the session registry
//!
//! A `Conversation` is the ordered message list sent to the model on every
//! turn. Sessions own exactly one conversation and live in the
//! `ConversationStore` until the call disconnects.

mod message;
mod store;

pub use message::{Conversation, Message, Role, ToolCall};
pub use store::{ConversationStore, Session, StoreError};
