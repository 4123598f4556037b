//! Events module for the UI boundary
//!
//! Provides the structured events a session publishes while a turn moves
//! through listening, generation, playback and interruption, plus the
//! record handed to the conversation store when a turn completes.

use serde::{Deserialize, Serialize};

use crate::session::SessionId;

/// Why in-flight work was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptReason {
    /// User resumed speaking during generation or playback
    BargeIn,
    /// Explicit cancel from outside (e.g. voice input re-activated)
    Cancelled,
}

/// Which part of the pipeline reported an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transcriber,
    Generation,
    Synthesis,
    Playback,
}

/// Events published to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    /// Recognizer update while the user is speaking
    TranscriptPartial { text: String },

    /// Recognizer closed an utterance
    TranscriptFinal { text: String },

    /// Response text for the turn, emitted with playback start
    AiTextReady {
        text: String,
        suggestions: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        artifact: Option<serde_json::Value>,
        generation: u64,
    },

    /// Response audio started
    PlaybackStarted {
        generation: u64,
        /// Clip length in milliseconds
        duration_ms: u64,
    },

    /// Response audio finished
    PlaybackEnded { generation: u64 },

    /// Pending work was cancelled; `generation` is the new generation
    Interrupted {
        generation: u64,
        reason: InterruptReason,
    },

    /// Something failed; the session keeps going unless it is a transcriber error
    Error { kind: ErrorKind, message: String },
}

impl std::fmt::Display for UiEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UiEvent::TranscriptPartial { text } => write!(f, "TRANSCRIPT_PARTIAL ({text})"),
            UiEvent::TranscriptFinal { text } => write!(f, "TRANSCRIPT_FINAL ({text})"),
            UiEvent::AiTextReady { generation, .. } => {
                write!(f, "AI_TEXT_READY (gen {generation})")
            }
            UiEvent::PlaybackStarted {
                generation,
                duration_ms,
            } => write!(f, "PLAYBACK_STARTED (gen {generation}, {duration_ms}ms)"),
            UiEvent::PlaybackEnded { generation } => write!(f, "PLAYBACK_ENDED (gen {generation})"),
            UiEvent::Interrupted { generation, reason } => {
                write!(f, "INTERRUPTED (gen {generation}, {reason:?})")
            }
            UiEvent::Error { kind, message } => write!(f, "ERROR ({kind:?}: {message})"),
        }
    }
}

/// A UI event with the session it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiEnvelope {
    pub session_id: SessionId,
    pub event: UiEvent,
}

/// One finished turn, handed to the conversation store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub user_transcript: String,
    pub ai_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_notes: Option<String>,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
}
