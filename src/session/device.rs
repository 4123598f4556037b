//! Exclusive lease on the audio output device
//!
//! Sessions share one playback controller. Whoever starts speaking takes
//! the lease, stopping any playback a previous owner left running.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::pipeline::{AudioClip, PlaybackController, PlaybackError};

use super::SessionId;

pub struct AudioDevice {
    controller: Arc<dyn PlaybackController>,
    owner: Mutex<Option<SessionId>>,
}

impl AudioDevice {
    pub fn new(controller: Arc<dyn PlaybackController>) -> Self {
        Self {
            controller,
            owner: Mutex::new(None),
        }
    }

    /// Take the device for `session_id`, stopping prior playback first
    pub async fn acquire(&self, session_id: &SessionId) {
        let mut owner = self.owner.lock().await;
        if let Some(previous) = owner.take() {
            debug!(%previous, next = %session_id, "stopping prior playback");
            self.controller.stop().await;
        }
        *owner = Some(session_id.clone());
    }

    /// Play a clip on behalf of the current owner
    pub async fn play(&self, clip: &AudioClip) -> Result<(), PlaybackError> {
        self.controller.play(clip).await
    }

    /// Stop playback if `session_id` holds the device; returns whether it did
    pub async fn stop_for(&self, session_id: &SessionId) -> bool {
        let mut owner = self.owner.lock().await;
        if owner.as_ref() != Some(session_id) {
            return false;
        }
        self.controller.stop().await;
        *owner = None;
        true
    }

    /// Give the device back after playback ended
    pub async fn release(&self, session_id: &SessionId) {
        let mut owner = self.owner.lock().await;
        if owner.as_ref() == Some(session_id) {
            *owner = None;
        }
    }

    pub async fn owner(&self) -> Option<SessionId> {
        self.owner.lock().await.clone()
    }
}
