//! Campaign lifecycle: PENDING → ACTIVE ⇄ PAUSED, with EXPIRED and
//! REJECTED as terminal states. Payment, date and authorization guards are
//! expressed as a transition table in [`state_machine`]; [`engine`] persists
//! the outcome through the campaign store.

pub mod engine;
pub mod state_machine;

pub use engine::LifecycleEngine;
pub use state_machine::{transition, EventKind, LifecycleEvent, Transition};
