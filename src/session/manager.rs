//! Registry of active sessions
//!
//! Maps conversation ids to running session workers. All sessions share
//! the collaborators and the audio device; each gets its own worker task.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{EngineConfig, EngineOverrides};
use crate::events::UiEnvelope;
use crate::pipeline::{Collaborators, PlaybackController};
use crate::turn::TranscriptEvent;

use super::device::AudioDevice;
use super::handle::{SessionError, SessionHandle};
use super::record::{SessionId, SessionStatus};
use super::worker;

const UI_CHANNEL_CAPACITY: usize = 256;

struct SessionEntry {
    handle: SessionHandle,
    task: JoinHandle<()>,
}

pub struct SessionManager {
    defaults: EngineConfig,
    collaborators: Collaborators,
    device: Arc<AudioDevice>,
    ui_tx: broadcast::Sender<UiEnvelope>,
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
}

impl SessionManager {
    pub fn new(
        defaults: EngineConfig,
        collaborators: Collaborators,
        playback: Arc<dyn PlaybackController>,
    ) -> Self {
        let (ui_tx, _) = broadcast::channel(UI_CHANNEL_CAPACITY);
        Self {
            defaults,
            collaborators,
            device: Arc::new(AudioDevice::new(playback)),
            ui_tx,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Receive UI events from every session
    pub fn subscribe(&self) -> broadcast::Receiver<UiEnvelope> {
        self.ui_tx.subscribe()
    }

    /// Turn voice input on for a conversation.
    ///
    /// A session that is already running has its pending work cancelled
    /// and keeps its settings; `overrides` only apply to new sessions.
    pub async fn activate(
        &self,
        id: SessionId,
        overrides: Option<&EngineOverrides>,
    ) -> Result<SessionHandle, SessionError> {
        let mut sessions = self.sessions.write().await;

        let running = sessions
            .get(&id)
            .filter(|entry| !entry.handle.is_closed())
            .map(|entry| entry.handle.clone());
        if let Some(handle) = running {
            // a full command channel must not stall other lookups
            drop(sessions);
            info!(session_id = %id, "session already active, cancelling pending work");
            handle.cancel().await?;
            return Ok(handle);
        }

        let config = match overrides {
            Some(overrides) => self.defaults.with_overrides(overrides)?,
            None => self.defaults.clone(),
        };

        let (handle, task) = worker::spawn(
            id.clone(),
            config,
            self.collaborators.clone(),
            Arc::clone(&self.device),
            self.ui_tx.clone(),
        );
        info!(session_id = %id, "session activated");
        sessions.insert(
            id,
            SessionEntry {
                handle: handle.clone(),
                task,
            },
        );
        Ok(handle)
    }

    /// Handle of a running session
    pub async fn handle(&self, id: &SessionId) -> Result<SessionHandle, SessionError> {
        let sessions = self.sessions.read().await;
        match sessions.get(id) {
            Some(entry) if !entry.handle.is_closed() => Ok(entry.handle.clone()),
            Some(_) => Err(SessionError::Closed(id.clone())),
            None => Err(SessionError::NotFound(id.clone())),
        }
    }

    /// Turn voice input off: cancel everything and forget the session
    pub async fn deactivate(&self, id: &SessionId) -> Result<(), SessionError> {
        let entry = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;

        // a worker that already stopped has nothing left to cancel
        if entry.handle.deactivate().await.is_ok() {
            if let Err(e) = entry.task.await {
                warn!(session_id = %id, error = %e, "session task failed");
            }
        }
        info!(session_id = %id, "session deactivated");
        Ok(())
    }

    pub async fn push_transcript(
        &self,
        id: &SessionId,
        event: TranscriptEvent,
    ) -> Result<(), SessionError> {
        self.handle(id).await?.push_transcript(event).await
    }

    pub async fn cancel(&self, id: &SessionId) -> Result<(), SessionError> {
        self.handle(id).await?.cancel().await
    }

    pub async fn transcriber_failed(
        &self,
        id: &SessionId,
        message: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.handle(id).await?.transcriber_failed(message).await
    }

    pub async fn status(&self, id: &SessionId) -> Result<SessionStatus, SessionError> {
        self.handle(id).await?.status().await
    }

    /// Status of every running session, ordered by id
    pub async fn statuses(&self) -> Vec<SessionStatus> {
        let handles: Vec<SessionHandle> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter(|entry| !entry.handle.is_closed())
                .map(|entry| entry.handle.clone())
                .collect()
        };

        let mut statuses = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(status) = handle.status().await {
                statuses.push(status);
            }
        }
        statuses.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        statuses
    }

    /// Deactivate every session
    pub async fn shutdown(&self) {
        let ids: Vec<SessionId> = self.sessions.read().await.keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.deactivate(&id).await {
                warn!(session_id = %id, error = %e, "failed to deactivate session");
            }
        }
        info!("all sessions stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use super::*;
    use crate::session::test_support::Harness;

    #[tokio::test(start_paused = true)]
    async fn test_reactivating_busy_session_leaves_registry_usable() {
        let h = Harness::instant();
        let other = h.activate("conv-other").await;

        // a session whose command channel is full
        let id = SessionId::new("conv-busy");
        let (command_tx, _command_rx) = mpsc::channel(1);
        let busy = SessionHandle::new(id.clone(), command_tx);
        busy.cancel().await.unwrap();
        h.manager.sessions.write().await.insert(
            id.clone(),
            SessionEntry {
                handle: busy,
                task: tokio::spawn(async {}),
            },
        );

        let reactivate = h.manager.activate(id, None);
        tokio::pin!(reactivate);
        assert!(timeout(Duration::from_millis(50), &mut reactivate)
            .await
            .is_err());

        let status = timeout(Duration::from_millis(50), h.manager.status(other.id()))
            .await
            .expect("registry stalled behind a busy session")
            .unwrap();
        assert_eq!(status.session_id, *other.id());
    }
}
