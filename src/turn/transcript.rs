//! Transcript events and the per-session transcript bookkeeping

use serde::{Deserialize, Serialize};

/// One update from the speech recognizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEvent {
    /// Full text of the current utterance so far
    pub text: String,
    /// Recognizer closed the utterance
    #[serde(default)]
    pub is_final: bool,
    /// Recognizer clock, strictly increasing
    pub timestamp_ms: u64,
}

impl TranscriptEvent {
    pub fn partial(text: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            timestamp_ms,
        }
    }

    pub fn final_(text: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            timestamp_ms,
        }
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// What the session knows about the user's words in the current turn
#[derive(Debug, Clone, Default)]
pub struct TranscriptState {
    /// Text of the most recent event
    pub latest: String,
    /// Finalized utterances belonging to the current turn
    pub committed: String,
    /// The last event was final; the next one opens a new utterance
    pub utterance_closed: bool,
    /// Leading characters of `latest` that were already answered
    pub turn_offset_chars: usize,
    /// The open utterance was answered and has not grown since
    pub answered_open: bool,
}

impl TranscriptState {
    /// Length the next event is measured against
    pub fn baseline_len(&self) -> usize {
        if self.utterance_closed {
            0
        } else {
            self.latest.chars().count()
        }
    }

    /// Record a new event's text
    pub fn update(&mut self, event: &TranscriptEvent, grew: bool) {
        if self.utterance_closed {
            self.turn_offset_chars = 0;
            self.answered_open = false;
        }
        if grew {
            self.answered_open = false;
        } else if self.answered_open {
            // a revision of answered words is still answered
            self.turn_offset_chars = event.char_len();
        }
        self.latest.clone_from(&event.text);
        self.utterance_closed = false;
    }

    /// Fold the current utterance into the committed text of the turn
    pub fn commit_utterance(&mut self) {
        let current = self.current_utterance();
        append_words(&mut self.committed, &current);
        self.utterance_closed = true;
        self.turn_offset_chars = 0;
        self.answered_open = false;
    }

    /// Words of the running utterance that belong to this turn
    pub fn current_utterance(&self) -> String {
        if self.utterance_closed {
            return String::new();
        }
        self.latest
            .chars()
            .skip(self.turn_offset_chars)
            .collect::<String>()
            .trim()
            .to_string()
    }

    /// Everything the user said in this turn, as sent to the generator
    pub fn turn_text(&self) -> String {
        let mut text = self.committed.clone();
        append_words(&mut text, &self.current_utterance());
        text
    }

    /// Start a fresh turn once the previous one has been answered
    pub fn mark_answered(&mut self) {
        self.committed.clear();
        self.answered_open = !self.utterance_closed;
        self.turn_offset_chars = if self.utterance_closed {
            0
        } else {
            self.latest.chars().count()
        };
    }

    pub fn word_count(&self) -> usize {
        self.turn_text().split_whitespace().count()
    }
}

fn append_words(target: &mut String, words: &str) {
    let words = words.trim();
    if words.is_empty() {
        return;
    }
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(words);
}
