//! Three-stage response cascade
//!
//! One cascade task runs per armed turn:
//! - T1: assemble context and call the generator
//! - T2: synthesize the generated text (waits for a late generator, bounded)
//! - T3: signal delivery (waits for late audio, bounded)
//!
//! Offsets are independent and measured from the same growth instant. The
//! task never touches session state; it reports generation-tagged
//! `StageMessage`s to the session worker, which decides what to keep.
//! Dropping the `CascadeHandle` cancels the task and any call it has in
//! flight.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, VoiceConfig};
use crate::session::SessionId;

use super::cache::{CachedAudio, CachedResponse};
use super::collaborators::{Collaborators, GenerationError, PlaybackError};

/// Stage offsets for one cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeSchedule {
    pub t1: Duration,
    pub t2: Duration,
    pub t3: Duration,
    pub max_extra_wait: Duration,
}

impl CascadeSchedule {
    /// Offsets for a turn of `word_count` words
    pub fn from_config(config: &EngineConfig, word_count: usize) -> Self {
        let extra = if config.adaptive_delay {
            adaptive_extra_ms(word_count)
        } else {
            0
        };
        Self {
            t1: Duration::from_millis(config.t1_ms + extra),
            t2: Duration::from_millis(config.t2_ms + extra),
            t3: Duration::from_millis(config.t3_ms + extra),
            max_extra_wait: Duration::from_millis(config.max_extra_wait_ms),
        }
    }
}

/// Extra silence granted to short turns so single words are not cut off
pub fn adaptive_extra_ms(word_count: usize) -> u64 {
    match word_count {
        0..=3 => 600,
        4..=6 => 300,
        _ => 0,
    }
}

/// Why a stage produced no value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageFailure {
    #[error("timed out")]
    TimedOut,

    #[error("{0}")]
    Failed(String),
}

/// Outcome of awaiting one stage
#[derive(Debug)]
pub enum StageResult<T> {
    Ready(T),
    Cancelled,
    Failed(StageFailure),
}

/// Progress reported to the session worker
#[derive(Debug)]
pub enum StageEvent {
    /// T1 fired; the generator has been called
    GenerationStarted { transcript: String },
    /// Generated text, or the fallback when generation failed
    Generated {
        response: CachedResponse,
        failure: Option<StageFailure>,
    },
    /// T2 fired with text available
    SynthesisStarted,
    Synthesized(CachedAudio),
    SynthesisFailed(StageFailure),
    /// T3 reached and audio resolved (ready, failed or timed out)
    DeliveryDue,
    /// Playback of this generation's audio ended
    PlaybackFinished(Result<(), PlaybackError>),
}

/// A stage event tagged with the generation that produced it
#[derive(Debug)]
pub struct StageMessage {
    pub generation: u64,
    pub event: StageEvent,
}

/// Owner-side handle of a running cascade; dropping it cancels the cascade
pub struct CascadeHandle {
    generation: u64,
    fast_forward: watch::Sender<bool>,
    _cancel_on_drop: DropGuard,
}

impl CascadeHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Fire every remaining stage as soon as its input is ready
    pub fn fast_forward(&self) {
        self.fast_forward.send_replace(true);
    }
}

impl std::fmt::Debug for CascadeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CascadeHandle")
            .field("generation", &self.generation)
            .finish()
    }
}

/// Everything a cascade task needs
pub struct Cascade {
    pub session_id: SessionId,
    pub generation: u64,
    /// Local instant of the growth event the offsets are measured from
    pub anchor: Instant,
    pub schedule: CascadeSchedule,
    /// Turn text as of now; read once when T1 fires
    pub transcript: watch::Receiver<String>,
    pub voice: VoiceConfig,
    pub fallback_text: String,
    pub collaborators: Collaborators,
    pub events: mpsc::UnboundedSender<StageMessage>,
}

impl Cascade {
    pub fn spawn(self) -> CascadeHandle {
        let token = CancellationToken::new();
        let (fast_forward, fast_forward_rx) = watch::channel(false);
        let generation = self.generation;

        tokio::spawn(self.run(token.clone(), fast_forward_rx));

        CascadeHandle {
            generation,
            fast_forward,
            _cancel_on_drop: token.drop_guard(),
        }
    }

    async fn run(self, token: CancellationToken, mut fast_forward: watch::Receiver<bool>) {
        let t1 = self.anchor + self.schedule.t1;
        let t2 = self.anchor + self.schedule.t2;
        let t3 = self.anchor + self.schedule.t3;

        debug!(
            session_id = %self.session_id,
            generation = self.generation,
            ?self.schedule,
            "cascade armed"
        );

        if !wait_stage(t1, &token, &mut fast_forward).await {
            return;
        }

        let transcript = self.transcript.borrow().clone();
        info!(
            session_id = %self.session_id,
            generation = self.generation,
            "T1: generating response"
        );
        self.emit(StageEvent::GenerationStarted {
            transcript: transcript.clone(),
        });

        let generation_call = self.generate(&transcript);
        let response = match await_bounded(generation_call, t2 + self.schedule.max_extra_wait, &token).await {
            StageResult::Ready(response) => {
                self.emit(StageEvent::Generated {
                    response: response.clone(),
                    failure: None,
                });
                response
            }
            StageResult::Failed(failure) => {
                warn!(
                    session_id = %self.session_id,
                    generation = self.generation,
                    %failure,
                    "generation failed, using fallback response"
                );
                let response = CachedResponse::fallback(&self.fallback_text, self.generation);
                self.emit(StageEvent::Generated {
                    response: response.clone(),
                    failure: Some(failure),
                });
                response
            }
            StageResult::Cancelled => return,
        };

        if !wait_stage(t2, &token, &mut fast_forward).await {
            return;
        }

        info!(
            session_id = %self.session_id,
            generation = self.generation,
            "T2: synthesizing response"
        );
        self.emit(StageEvent::SynthesisStarted);

        let synthesis_call = self
            .collaborators
            .synthesizer
            .synthesize(&response.text, &self.voice);
        match await_bounded(synthesis_call, t3 + self.schedule.max_extra_wait, &token).await {
            StageResult::Ready(clip) => self.emit(StageEvent::Synthesized(CachedAudio {
                clip,
                generation: self.generation,
            })),
            StageResult::Failed(failure) => {
                warn!(
                    session_id = %self.session_id,
                    generation = self.generation,
                    %failure,
                    "synthesis failed, response will be text only"
                );
                self.emit(StageEvent::SynthesisFailed(failure));
            }
            StageResult::Cancelled => return,
        }

        if !wait_stage(t3, &token, &mut fast_forward).await {
            return;
        }

        info!(
            session_id = %self.session_id,
            generation = self.generation,
            "T3: delivery due"
        );
        self.emit(StageEvent::DeliveryDue);
    }

    async fn generate(&self, transcript: &str) -> Result<CachedResponse, GenerationError> {
        let context = self
            .collaborators
            .context
            .assemble_context(&self.session_id)
            .await?;
        let response = self
            .collaborators
            .generator
            .generate(&context, transcript)
            .await?;
        Ok(CachedResponse::from_generated(response, self.generation))
    }

    fn emit(&self, event: StageEvent) {
        let _ = self.events.send(StageMessage {
            generation: self.generation,
            event,
        });
    }
}

/// Sleep until `deadline` unless fast-forwarded; false when cancelled
async fn wait_stage(
    deadline: Instant,
    token: &CancellationToken,
    fast_forward: &mut watch::Receiver<bool>,
) -> bool {
    if *fast_forward.borrow() {
        return !token.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = sleep_until(deadline) => true,
        Ok(_) = fast_forward.wait_for(|ff| *ff) => !token.is_cancelled(),
    }
}

/// Await a stage call, bounded by `deadline` and abandoned on cancellation
async fn await_bounded<F, T, E>(call: F, deadline: Instant, token: &CancellationToken) -> StageResult<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => StageResult::Cancelled,
        outcome = timeout_at(deadline, call) => match outcome {
            Ok(Ok(value)) => StageResult::Ready(value),
            Ok(Err(e)) => StageResult::Failed(StageFailure::Failed(e.to_string())),
            Err(_) => StageResult::Failed(StageFailure::TimedOut),
        },
    }
}
