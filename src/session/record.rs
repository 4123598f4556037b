//! Per-conversation session record

use serde::{Deserialize, Serialize};
use tokio_util::sync::DropGuard;

use crate::config::EngineConfig;
use crate::pipeline::{CascadeHandle, ResponseCache};
use crate::state::{SessionState, StateMachine};
use crate::turn::TranscriptState;

/// Conversation id a session is addressed by
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// All mutable state of one conversation. Owned by its worker task.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub config: EngineConfig,
    pub machine: StateMachine,
    pub transcript: TranscriptState,
    /// Recognizer timestamp of the event that last armed the cascade.
    /// Reported in status only; stage timers run from the local receive time.
    pub last_growth_timestamp_ms: Option<u64>,
    pub generation: u64,
    /// Stage timers of the armed cascade; dropping cancels them
    pub cascade: Option<CascadeHandle>,
    /// Cancels the playback watcher task
    pub playback: Option<DropGuard>,
    pub cache: ResponseCache,
    pub in_pipeline: bool,
    pub is_speaking: bool,
}

impl Session {
    pub fn new(id: SessionId, config: EngineConfig) -> Self {
        Self {
            id,
            config,
            machine: StateMachine::new(),
            transcript: TranscriptState::default(),
            last_growth_timestamp_ms: None,
            generation: 0,
            cascade: None,
            playback: None,
            cache: ResponseCache::new(),
            in_pipeline: false,
            is_speaking: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.id.clone(),
            state: self.state(),
            generation: self.generation,
            in_pipeline: self.in_pipeline,
            is_speaking: self.is_speaking,
            latest_transcript: self.transcript.latest.clone(),
            last_growth_timestamp_ms: self.last_growth_timestamp_ms,
        }
    }
}

/// Snapshot of a session for status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: SessionId,
    pub state: SessionState,
    pub generation: u64,
    pub in_pipeline: bool,
    pub is_speaking: bool,
    pub latest_transcript: String,
    pub last_growth_timestamp_ms: Option<u64>,
}
