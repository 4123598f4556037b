//! Stand-in collaborators for running the daemon without external services
//!
//! - EchoGenerator: acknowledges the transcript
//! - WordRateSynthesizer: clip length from word count and speaking rate
//! - TimedPlayback: waits out the clip unless stopped
//! - JsonlConversationStore: recent turns in memory, full log on disk

mod echo;
mod playback;
mod speech;
mod store;

pub use echo::EchoGenerator;
pub use playback::TimedPlayback;
pub use speech::WordRateSynthesizer;
pub use store::JsonlConversationStore;
