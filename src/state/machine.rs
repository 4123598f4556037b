//! Core session state machine implementation
//!
//! Handles transitions between Idle, Listening, Pending and Speaking.
//! Interruption returns to Listening from any active state; deactivation
//! and transcriber failure return to Idle from anywhere.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::info;

/// The four possible states of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Voice input off
    #[default]
    Idle,
    /// Transcript stream active, no cascade armed
    Listening,
    /// Cascade armed; generation or synthesis may be in flight
    Pending,
    /// Response audio is playing
    Speaking,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Listening => write!(f, "Listening"),
            SessionState::Pending => write!(f, "Pending"),
            SessionState::Speaking => write!(f, "Speaking"),
        }
    }
}

/// Rejected state change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid session transition {from} -> {to}")]
pub struct TransitionError {
    pub from: SessionState,
    pub to: SessionState,
}

/// Tracks the current state and when it was entered
#[derive(Debug)]
pub struct StateMachine {
    state: SessionState,
    state_entered_at: Instant,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            state_entered_at: Instant::now(),
        }
    }

    /// Get the current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether moving from the current state to `to` is allowed
    pub fn can_transition(&self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self.state, to),
            (Idle, Listening)
                | (Listening, Pending)
                | (Pending, Speaking)
                | (Pending, Listening)
                | (Speaking, Listening)
                | (_, Idle)
        )
    }

    /// Perform a state transition; staying in the same state is a no-op
    pub fn transition_to(&mut self, new_state: SessionState) -> Result<(), TransitionError> {
        let old_state = self.state;
        if old_state == new_state {
            return Ok(());
        }
        if !self.can_transition(new_state) {
            return Err(TransitionError {
                from: old_state,
                to: new_state,
            });
        }

        let duration_ms = self.state_entered_at.elapsed().as_millis() as u64;
        info!(
            from = %old_state,
            to = %new_state,
            duration_ms = duration_ms,
            "state transition"
        );

        self.state = new_state;
        self.state_entered_at = Instant::now();
        Ok(())
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
