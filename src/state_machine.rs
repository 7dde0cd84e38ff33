//! Per-call state machine
//!
//! Pure transitions in the Elm style: `(state, event) -> (state, effects)`.
//! All I/O lives in the runtime that executes the effects.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::{Effect, IgnoreReason};
pub use event::CallEvent;
pub use state::CallState;
pub use transition::transition;
