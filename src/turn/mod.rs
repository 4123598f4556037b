//! Turn detection module
//!
//! Classifies recognizer updates so that only new speech restarts the
//! silence timers:
//! - Growth: user is still producing words
//! - Refinement: recognizer revising words already spoken
//! - Finalize: recognizer closed the utterance

mod detector;
mod transcript;

pub use detector::{TurnClass, TurnDecision, TurnDetector};
pub use transcript::{TranscriptEvent, TranscriptState};
