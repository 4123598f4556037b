use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::config::VoiceConfig;
use crate::pipeline::{AudioClip, SynthesisError, Synthesizer};

const MIN_CLIP_MS: u64 = 300;

/// Synthesizer producing silent clips as long as the words would take to say
#[derive(Debug, Default)]
pub struct WordRateSynthesizer {
    next_clip: AtomicU64,
}

impl WordRateSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Speaking time of `text` at `rate_wpm`
pub fn spoken_duration_ms(text: &str, rate_wpm: u32) -> u64 {
    let words = text.split_whitespace().count() as u64;
    let rate = u64::from(rate_wpm.max(1));
    (words * 60_000 / rate).max(MIN_CLIP_MS)
}

#[async_trait]
impl Synthesizer for WordRateSynthesizer {
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<AudioClip, SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        let id = self.next_clip.fetch_add(1, Ordering::Relaxed);
        Ok(AudioClip {
            handle: format!("{}-{id}", voice.voice),
            bytes: Vec::new(),
            duration_ms: spoken_duration_ms(text, voice.rate_wpm),
        })
    }
}
