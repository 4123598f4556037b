//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::config::EngineOverrides;
use crate::events::UiEnvelope;
use crate::session::{SessionId, SessionStatus};
use crate::turn::TranscriptEvent;

/// Requests from a client (UI or transcriber) to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Turn voice input on for a conversation
    Activate {
        session_id: SessionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        config: Option<EngineOverrides>,
    },

    /// Turn voice input off
    Deactivate { session_id: SessionId },

    /// Next recognizer event for a session
    Transcript {
        session_id: SessionId,
        event: TranscriptEvent,
    },

    /// Cancel pending generation or playback
    Cancel { session_id: SessionId },

    /// The transcription engine for a session failed
    TranscriberFailed {
        session_id: SessionId,
        message: String,
    },

    /// Ping to check connectivity
    Ping,

    /// Subscribe to UI event notifications
    Subscribe,
}

/// Responses from daemon to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Session is listening
    Activated { session_id: SessionId },

    /// Session was stopped
    Deactivated { session_id: SessionId },

    /// Request was queued for the session
    Accepted,

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Push notification from daemon to subscribed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A session published a UI event
    Ui(UiEnvelope),
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Uptime in seconds
    pub uptime_secs: u64,

    /// Every active session
    pub sessions: Vec<SessionStatus>,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: 0,
            sessions: Vec::new(),
        }
    }
}
