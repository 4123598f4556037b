//! State machine module for session lifecycle
//!
//! Provides an explicit state machine with four states:
//! - Idle: voice input off
//! - Listening: transcript stream active, nothing armed
//! - Pending: response cascade armed or in flight
//! - Speaking: response audio playing

mod machine;

pub use machine::{SessionState, StateMachine, TransitionError};
