//! Generation-tagged response cache
//!
//! Holds the text and audio produced for the current turn. Every read and
//! write names the generation it belongs to; entries from any other
//! generation are refused.

use tracing::debug;

use super::collaborators::{AudioClip, GeneratedResponse};

/// Generated text for one turn
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub text: String,
    pub suggestions: Vec<String>,
    pub artifact: Option<serde_json::Value>,
    pub notes: Option<String>,
    pub generation: u64,
}

impl CachedResponse {
    pub fn from_generated(response: GeneratedResponse, generation: u64) -> Self {
        let mut suggestions = response.suggestions;
        suggestions.truncate(super::collaborators::MAX_SUGGESTIONS);
        Self {
            text: response.text,
            suggestions,
            artifact: response.artifact,
            notes: response.notes,
            generation,
        }
    }

    /// Fixed response used when generation fails
    pub fn fallback(text: &str, generation: u64) -> Self {
        Self {
            text: text.to_string(),
            suggestions: Vec::new(),
            artifact: None,
            notes: None,
            generation,
        }
    }
}

/// Synthesized audio for one turn
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAudio {
    pub clip: AudioClip,
    pub generation: u64,
}

/// Per-session cache slots
#[derive(Debug, Default)]
pub struct ResponseCache {
    llm: Option<CachedResponse>,
    tts: Option<CachedAudio>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store generated text; refused unless it belongs to `current`
    pub fn store_response(&mut self, current: u64, response: CachedResponse) -> bool {
        if response.generation != current {
            debug!(
                current,
                stale = response.generation,
                "discarding stale response"
            );
            return false;
        }
        self.llm = Some(response);
        true
    }

    /// Store synthesized audio; refused unless it belongs to `current`
    pub fn store_audio(&mut self, current: u64, audio: CachedAudio) -> bool {
        if audio.generation != current {
            debug!(current, stale = audio.generation, "discarding stale audio");
            return false;
        }
        self.tts = Some(audio);
        true
    }

    pub fn response(&self, current: u64) -> Option<&CachedResponse> {
        self.llm.as_ref().filter(|r| r.generation == current)
    }

    pub fn audio(&self, current: u64) -> Option<&CachedAudio> {
        self.tts.as_ref().filter(|a| a.generation == current)
    }

    /// Remove and return everything for `current`, leaving the cache empty.
    ///
    /// Returns `None` when no text for `current` is cached; audio is only
    /// returned alongside text of the same generation.
    pub fn take_for_delivery(&mut self, current: u64) -> Option<(CachedResponse, Option<CachedAudio>)> {
        let llm = self.llm.take();
        let tts = self.tts.take();
        let response = llm.filter(|r| r.generation == current)?;
        let audio = tts.filter(|a| a.generation == current);
        Some((response, audio))
    }

    pub fn clear(&mut self) {
        self.llm = None;
        self.tts = None;
    }

    pub fn is_empty(&self) -> bool {
        self.llm.is_none() && self.tts.is_none()
    }
}
