//! Response pipeline module
//!
//! Turns an armed turn into a delivered response:
//! - collaborators: traits for the generator, synthesizer, playback and store
//! - cascade: the T1/T2/T3 timer task
//! - cache: generation-tagged text and audio slots

mod cache;
mod cascade;
mod collaborators;

pub use cache::{CachedAudio, CachedResponse, ResponseCache};
pub use cascade::{
    Cascade, CascadeHandle, CascadeSchedule, StageEvent, StageFailure, StageMessage,
};
pub use collaborators::{
    AudioClip, Collaborators, ContextError, ContextProvider, ConversationContext,
    ConversationStore, GeneratedResponse, GenerationError, PlaybackController, PlaybackError,
    ResponseGenerator, StoreError, Synthesizer, SynthesisError,
};
