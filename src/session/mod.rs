//! Session module
//!
//! One session per conversation. Each session is driven by a single
//! worker task that owns the transcript, the state machine, the cascade
//! and the response cache:
//! - handle: cloneable command sender
//! - worker: the event loop
//! - interruption: barge-in and cancel
//! - device: shared audio output lease
//! - manager: id to session registry

mod device;
mod handle;
mod interruption;
mod manager;
mod record;
mod worker;

#[cfg(test)]
pub(crate) mod test_support;
#[cfg(test)]
mod tests;

pub use device::AudioDevice;
pub use handle::{SessionError, SessionHandle};
pub use interruption::should_interrupt;
pub use manager::SessionManager;
pub use record::{Session, SessionId, SessionStatus};
