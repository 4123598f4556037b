//! Growth / refinement / finalize classification of transcript events
//!
//! Recognizers keep revising already-spoken words while the user is silent.
//! Only genuine growth may restart the silence timers, otherwise the cascade
//! could never fire during a natural pause.

use tracing::trace;

use super::transcript::{TranscriptEvent, TranscriptState};

/// How a transcript event affects the silence timers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnClass {
    /// New words: (re)arm the cascade
    Growth,
    /// Revision of already-spoken text: leave timers alone
    Refinement,
    /// Recognizer closed the utterance
    Finalize,
}

impl std::fmt::Display for TurnClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnClass::Growth => write!(f, "GROWTH"),
            TurnClass::Refinement => write!(f, "REFINEMENT"),
            TurnClass::Finalize => write!(f, "FINALIZE"),
        }
    }
}

/// Result of classifying one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnDecision {
    pub class: TurnClass,
    /// Character delta against the previous text of the utterance
    pub delta: i64,
    /// The event carries new spoken content
    pub grew: bool,
}

/// Stateless classifier; the transcript state lives in the session
#[derive(Debug, Clone, Copy)]
pub struct TurnDetector {
    refinement_threshold_chars: usize,
}

impl TurnDetector {
    pub fn new(refinement_threshold_chars: usize) -> Self {
        Self {
            refinement_threshold_chars,
        }
    }

    /// Classify `event` and record its text in `state`
    pub fn classify(&self, state: &mut TranscriptState, event: &TranscriptEvent) -> TurnDecision {
        let baseline = state.baseline_len();
        let len = event.char_len();
        let delta = len as i64 - baseline as i64;

        // The first words of a fresh utterance are speech even when short
        let opens_utterance = baseline == 0 && !event.text.trim().is_empty();
        let grew = opens_utterance || delta > self.refinement_threshold_chars as i64;

        let class = if event.is_final {
            TurnClass::Finalize
        } else if grew {
            TurnClass::Growth
        } else {
            TurnClass::Refinement
        };

        trace!(%class, delta, baseline, "classified transcript event");

        state.update(event, grew);

        TurnDecision { class, delta, grew }
    }
}

impl Default for TurnDetector {
    fn default() -> Self {
        Self::new(2)
    }
}
