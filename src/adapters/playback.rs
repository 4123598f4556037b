use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::pipeline::{AudioClip, PlaybackController, PlaybackError};

/// Playback that simply waits for the clip's duration
#[derive(Debug, Default)]
pub struct TimedPlayback {
    current: Mutex<Option<CancellationToken>>,
}

impl TimedPlayback {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlaybackController for TimedPlayback {
    async fn play(&self, clip: &AudioClip) -> Result<(), PlaybackError> {
        let token = CancellationToken::new();
        if let Some(previous) = self.current.lock().await.replace(token.clone()) {
            previous.cancel();
        }

        debug!(handle = %clip.handle, duration_ms = clip.duration_ms, "playing");
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(clip.duration_ms)) => {
                debug!(handle = %clip.handle, "playback finished");
            }
            _ = token.cancelled() => {
                debug!(handle = %clip.handle, "playback stopped");
            }
        }
        Ok(())
    }

    async fn stop(&self) {
        if let Some(token) = self.current.lock().await.take() {
            token.cancel();
        }
    }
}
