//! Events that can occur on a call

/// Caller-side events, already decoded from the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    /// Call started; binds the connection to `call_sid`
    Setup { call_sid: String },
    /// Transcribed caller speech
    Prompt { text: String },
    /// Caller spoke over the assistant; `heard` is what reached them
    Interrupt { heard: String },
    /// Connection closed
    Disconnect,
    /// Any message type the relay does not handle
    Unknown { kind: String },
}

impl CallEvent {
    /// Short name for logging
    pub fn name(&self) -> &str {
        match self {
            CallEvent::Setup { .. } => "setup",
            CallEvent::Prompt { .. } => "prompt",
            CallEvent::Interrupt { .. } => "interrupt",
            CallEvent::Disconnect => "disconnect",
            CallEvent::Unknown { kind } => kind,
        }
    }
}
