//! Cloneable handle used to drive a session worker

use tokio::sync::{mpsc, oneshot};

use crate::config::ConfigError;
use crate::turn::TranscriptEvent;

use super::record::{SessionId, SessionStatus};

/// Commands accepted by a session worker, processed strictly in order
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Transcript(TranscriptEvent),
    Cancel,
    TranscriberFailed(String),
    Status(oneshot::Sender<SessionStatus>),
    Deactivate,
}

/// Errors returned when addressing a session
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no active session {0}")]
    NotFound(SessionId),

    #[error("session {0} has stopped")]
    Closed(SessionId),

    #[error("invalid session configuration: {0}")]
    Config(#[from] ConfigError),
}

impl SessionError {
    /// Stable code reported over IPC
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::NotFound(_) => "session_not_found",
            SessionError::Closed(_) => "session_closed",
            SessionError::Config(_) => "invalid_config",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub(crate) fn new(id: SessionId, commands: mpsc::Sender<SessionCommand>) -> Self {
        Self { id, commands }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Whether the worker has exited
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Queue the next recognizer event
    pub async fn push_transcript(&self, event: TranscriptEvent) -> Result<(), SessionError> {
        self.send(SessionCommand::Transcript(event)).await
    }

    /// Cancel pending generation or playback
    pub async fn cancel(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Cancel).await
    }

    /// Report that the transcription engine died; the session goes idle
    pub async fn transcriber_failed(&self, message: impl Into<String>) -> Result<(), SessionError> {
        self.send(SessionCommand::TranscriberFailed(message.into()))
            .await
    }

    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Status(tx)).await?;
        rx.await.map_err(|_| SessionError::Closed(self.id.clone()))
    }

    pub(crate) async fn deactivate(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Deactivate).await
    }

    async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Closed(self.id.clone()))
    }
}
