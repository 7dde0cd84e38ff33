//! Effects produced by state transitions

/// Effects to be executed after a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Register a fresh session
    CreateSession { call_sid: String },

    /// Drop `previous` and register a fresh session for `call_sid`
    ReplaceSession { previous: String, call_sid: String },

    /// Append the caller's utterance and stream a reply
    RunTurn { call_sid: String, text: String },

    /// Cut the history back to what the caller heard
    Truncate { call_sid: String, heard: String },

    /// Tear down the session and cancel in-flight work
    DestroySession { call_sid: String },

    /// Nothing to do; logged with the reason
    Ignore { reason: IgnoreReason },
}

/// Why an event produced no work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Prompt or interrupt before setup
    NoSession,
    /// Event after disconnect
    Terminated,
    /// Message type the relay does not handle
    UnknownEvent(String),
}

impl Effect {
    pub fn ignore(reason: IgnoreReason) -> Self {
        Effect::Ignore { reason }
    }
}
