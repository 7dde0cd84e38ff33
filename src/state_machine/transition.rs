//! Pure state transition function

use super::{CallEvent, CallState, Effect, IgnoreReason};

/// Result of a state transition
#[derive(Debug, PartialEq, Eq)]
pub struct TransitionResult {
    pub new_state: CallState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: CallState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs and performs
/// no I/O. Every event is accepted; events that cannot apply in the current
/// state produce an `Ignore` effect instead of an error.
pub fn transition(state: &CallState, event: CallEvent) -> TransitionResult {
    match (state, event) {
        // Nothing leaves Terminated
        (CallState::Terminated, _) => TransitionResult::new(CallState::Terminated)
            .with_effect(Effect::ignore(IgnoreReason::Terminated)),

        (_, CallEvent::Disconnect) => match state.call_sid() {
            Some(call_sid) => TransitionResult::new(CallState::Terminated).with_effect(
                Effect::DestroySession {
                    call_sid: call_sid.to_string(),
                },
            ),
            None => TransitionResult::new(CallState::Terminated),
        },

        (CallState::Idle, CallEvent::Setup { call_sid }) => TransitionResult::new(
            CallState::Active {
                call_sid: call_sid.clone(),
            },
        )
        .with_effect(Effect::CreateSession { call_sid }),

        // Second setup on the same connection overwrites the session
        (CallState::Active { call_sid: previous }, CallEvent::Setup { call_sid }) => {
            TransitionResult::new(CallState::Active {
                call_sid: call_sid.clone(),
            })
            .with_effect(Effect::ReplaceSession {
                previous: previous.clone(),
                call_sid,
            })
        }

        (CallState::Active { call_sid }, CallEvent::Prompt { text }) => {
            TransitionResult::new(state.clone()).with_effect(Effect::RunTurn {
                call_sid: call_sid.clone(),
                text,
            })
        }

        (CallState::Active { call_sid }, CallEvent::Interrupt { heard }) => {
            TransitionResult::new(state.clone()).with_effect(Effect::Truncate {
                call_sid: call_sid.clone(),
                heard,
            })
        }

        (CallState::Idle, CallEvent::Prompt { .. } | CallEvent::Interrupt { .. }) => {
            TransitionResult::new(CallState::Idle).with_effect(Effect::ignore(IgnoreReason::NoSession))
        }

        (_, CallEvent::Unknown { kind }) => TransitionResult::new(state.clone())
            .with_effect(Effect::ignore(IgnoreReason::UnknownEvent(kind))),
    }
}
