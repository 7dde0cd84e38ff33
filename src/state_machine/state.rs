//! Call state types

/// Lifecycle of one relay connection
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CallState {
    /// Socket open, no setup received yet
    #[default]
    Idle,
    /// A session exists for `call_sid`
    Active { call_sid: String },
    /// Socket closed; nothing more is processed
    Terminated,
}

impl CallState {
    /// Call identifier of the live session, if any
    pub fn call_sid(&self) -> Option<&str> {
        match self {
            CallState::Active { call_sid } => Some(call_sid),
            CallState::Idle | CallState::Terminated => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Terminated)
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            CallState::Idle => "idle",
            CallState::Active { .. } => "active",
            CallState::Terminated => "terminated",
        }
    }
}
