//! Barge-in and cancellation
//!
//! An interruption is one step of the session worker: it bumps the
//! generation, cancels the cascade, stops owned playback and clears the
//! cache before any further event is looked at. Results still in flight
//! carry the old generation and are dropped when they arrive.

use tracing::info;

use crate::events::{InterruptReason, UiEvent};
use crate::state::SessionState;

use super::record::Session;
use super::worker::SessionWorker;

/// New speech cancels the current response only once work has started
pub fn should_interrupt(session: &Session) -> bool {
    session.in_pipeline || session.is_speaking
}

impl SessionWorker {
    pub(super) async fn interrupt(&mut self, reason: InterruptReason) {
        let from = self.session.state();
        self.session.generation += 1;
        self.reset_pipeline().await;
        self.transition(SessionState::Listening);

        info!(
            session_id = %self.session.id,
            generation = self.session.generation,
            from = %from,
            ?reason,
            "interrupted"
        );
        self.publish(UiEvent::Interrupted {
            generation: self.session.generation,
            reason,
        });
    }

    /// Drop the cascade, the playback watcher and everything cached
    pub(super) async fn reset_pipeline(&mut self) {
        self.session.cascade = None;
        self.session.playback = None;
        if self.session.is_speaking {
            self.device.stop_for(&self.session.id).await;
        }
        self.session.is_speaking = false;
        self.session.in_pipeline = false;
        self.session.cache.clear();
    }
}
