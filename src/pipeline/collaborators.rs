//! External collaborators consumed by the response pipeline
//!
//! The engine never talks to an LLM, a TTS engine or an audio device
//! directly; it drives these traits. Adapters live in `crate::adapters`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::VoiceConfig;
use crate::events::TurnRecord;
use crate::session::SessionId;

/// Upper bound on suggestions forwarded to the UI
pub const MAX_SUGGESTIONS: usize = 4;

/// Context assembled for one turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub session_id: String,
    /// Earlier turns, oldest first
    pub recent_turns: Vec<TurnRecord>,
}

/// Output of the response generator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedResponse {
    pub text: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Structured payload rendered by the UI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<serde_json::Value>,
    /// Private notes kept with the conversation record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Synthesized audio ready for playback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    /// Opaque id understood by the playback controller
    pub handle: String,
    pub bytes: Vec<u8>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("context assembly failed: {0}")]
    Context(#[from] ContextError),

    #[error("response generation failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("context provider error: {0}")]
pub struct ContextError(pub String);

#[derive(Debug, Clone, thiserror::Error)]
pub enum SynthesisError {
    #[error("speech synthesis failed: {0}")]
    Failed(String),

    #[error("nothing to synthesize")]
    EmptyText,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("playback failed: {0}")]
pub struct PlaybackError(pub String);

#[derive(Debug, Clone, thiserror::Error)]
#[error("conversation store error: {0}")]
pub struct StoreError(pub String);

/// Produces the response text for a finished turn
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(
        &self,
        context: &ConversationContext,
        transcript: &str,
    ) -> Result<GeneratedResponse, GenerationError>;
}

/// Renders response text to audio
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<AudioClip, SynthesisError>;
}

/// Owns the audio output device
#[async_trait]
pub trait PlaybackController: Send + Sync {
    /// Play the clip; resolves once playback has ended or was stopped
    async fn play(&self, clip: &AudioClip) -> Result<(), PlaybackError>;

    /// Stop whatever is playing; must take effect promptly
    async fn stop(&self);
}

/// Builds the conversation context for a turn
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn assemble_context(&self, session_id: &SessionId) -> Result<ConversationContext, ContextError>;
}

/// Persists finished turns
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn persist(&self, session_id: &SessionId, record: TurnRecord) -> Result<(), StoreError>;
}

/// Shared handles to the collaborators every session uses
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn ResponseGenerator>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub context: Arc<dyn ContextProvider>,
    pub store: Arc<dyn ConversationStore>,
}
