//! Wire types for the relay socket and HTTP routes

use crate::runtime::StreamEvent;
use crate::state_machine::CallEvent;
use serde::{Deserialize, Serialize};

/// Message from the phone platform
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundMessage {
    #[serde(rename_all = "camelCase")]
    Setup { call_sid: String },
    #[serde(rename_all = "camelCase")]
    Prompt { voice_prompt: String },
    #[serde(rename_all = "camelCase")]
    Interrupt { utterance_until_interrupt: String },
    /// dtmf, info, error and anything newer
    #[serde(other)]
    Other,
}

/// Just the tag, for naming messages we do not handle
#[derive(Debug, Deserialize)]
struct MessageType {
    #[serde(rename = "type")]
    kind: String,
}

/// Decode a text frame into a call event
pub fn parse_inbound(text: &str) -> Result<CallEvent, serde_json::Error> {
    let event = match serde_json::from_str(text)? {
        InboundMessage::Setup { call_sid } => CallEvent::Setup { call_sid },
        InboundMessage::Prompt { voice_prompt } => CallEvent::Prompt { text: voice_prompt },
        InboundMessage::Interrupt {
            utterance_until_interrupt,
        } => CallEvent::Interrupt {
            heard: utterance_until_interrupt,
        },
        InboundMessage::Other => {
            let MessageType { kind } = serde_json::from_str(text)?;
            CallEvent::Unknown { kind }
        }
    };
    Ok(event)
}

/// Message to the phone platform
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundMessage {
    Text { token: String, last: bool },
}

impl From<StreamEvent> for OutboundMessage {
    fn from(event: StreamEvent) -> Self {
        OutboundMessage::Text {
            token: event.token,
            last: event.last,
        }
    }
}

/// Response for the health route
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_sessions: usize,
}
