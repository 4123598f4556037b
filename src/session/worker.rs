//! Session worker: the single event loop that owns a `Session`
//!
//! Transcript commands and cascade/playback reports are handled one at a
//! time on this task, so every mutation of the session (including an
//! interruption) is atomic with respect to every pipeline callback.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, FinalizePolicy};
use crate::events::{ErrorKind, InterruptReason, TurnRecord, UiEnvelope, UiEvent};
use crate::pipeline::{
    CachedAudio, Cascade, CascadeSchedule, Collaborators, PlaybackError, StageEvent, StageMessage,
};
use crate::state::SessionState;
use crate::turn::{TranscriptEvent, TurnClass, TurnDecision, TurnDetector};

use super::device::AudioDevice;
use super::handle::{SessionCommand, SessionHandle};
use super::record::{Session, SessionId};

const COMMAND_CAPACITY: usize = 64;

pub(crate) struct SessionWorker {
    pub(super) session: Session,
    detector: TurnDetector,
    collaborators: Collaborators,
    pub(super) device: Arc<AudioDevice>,
    ui: broadcast::Sender<UiEnvelope>,
    /// Turn text the armed cascade reads at T1
    transcript_tx: watch::Sender<String>,
    stage_tx: mpsc::UnboundedSender<StageMessage>,
}

/// Start a worker for a new session, already Listening
pub(crate) fn spawn(
    id: SessionId,
    config: EngineConfig,
    collaborators: Collaborators,
    device: Arc<AudioDevice>,
    ui: broadcast::Sender<UiEnvelope>,
) -> (SessionHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (stage_tx, stage_rx) = mpsc::unbounded_channel();
    let worker = SessionWorker::new(id.clone(), config, collaborators, device, ui, stage_tx);

    let task = tokio::spawn(worker.run(command_rx, stage_rx));
    (SessionHandle::new(id, command_tx), task)
}

impl SessionWorker {
    pub(super) fn new(
        id: SessionId,
        config: EngineConfig,
        collaborators: Collaborators,
        device: Arc<AudioDevice>,
        ui: broadcast::Sender<UiEnvelope>,
        stage_tx: mpsc::UnboundedSender<StageMessage>,
    ) -> Self {
        let (transcript_tx, _) = watch::channel(String::new());
        let mut worker = Self {
            detector: TurnDetector::new(config.refinement_threshold_chars),
            session: Session::new(id, config),
            collaborators,
            device,
            ui,
            transcript_tx,
            stage_tx,
        };
        worker.transition(SessionState::Listening);
        worker
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut stages: mpsc::UnboundedReceiver<StageMessage>,
    ) {
        info!(session_id = %self.session.id, "session started");

        loop {
            tokio::select! {
                biased;
                command = commands.recv() => {
                    let Some(command) = command else {
                        debug!(session_id = %self.session.id, "all handles dropped");
                        self.shut_down().await;
                        break;
                    };
                    if self.handle_command(command).await.is_break() {
                        break;
                    }
                }
                Some(message) = stages.recv() => {
                    self.handle_stage(message).await;
                }
            }
        }

        info!(session_id = %self.session.id, "session stopped");
    }

    async fn handle_command(&mut self, command: SessionCommand) -> ControlFlow<()> {
        match command {
            SessionCommand::Transcript(event) => self.on_transcript(event).await,
            SessionCommand::Cancel => self.on_cancel().await,
            SessionCommand::Status(reply) => {
                let _ = reply.send(self.session.status());
            }
            SessionCommand::TranscriberFailed(message) => {
                warn!(session_id = %self.session.id, %message, "transcriber failed, session going idle");
                self.publish(UiEvent::Error {
                    kind: ErrorKind::Transcriber,
                    message,
                });
                self.shut_down().await;
                return ControlFlow::Break(());
            }
            SessionCommand::Deactivate => {
                self.shut_down().await;
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    pub(super) async fn on_transcript(&mut self, event: TranscriptEvent) {
        if self.session.state() == SessionState::Idle {
            warn!(session_id = %self.session.id, "transcript while voice input is off, ignoring");
            return;
        }

        let decision = self
            .detector
            .classify(&mut self.session.transcript, &event);
        debug!(
            session_id = %self.session.id,
            class = %decision.class,
            delta = decision.delta,
            timestamp_ms = event.timestamp_ms,
            "transcript event"
        );

        if decision.grew && super::interruption::should_interrupt(&self.session) {
            self.interrupt(InterruptReason::BargeIn).await;
        }

        if event.is_final {
            self.session.transcript.commit_utterance();
            self.publish(UiEvent::TranscriptFinal {
                text: event.text.clone(),
            });
        } else {
            self.publish(UiEvent::TranscriptPartial {
                text: event.text.clone(),
            });
        }
        self.transcript_tx
            .send_replace(self.session.transcript.turn_text());

        match decision.class {
            TurnClass::Growth => self.arm_cascade(event.timestamp_ms),
            TurnClass::Refinement => {}
            TurnClass::Finalize => self.finalize(decision, event.timestamp_ms),
        }
    }

    fn finalize(&mut self, decision: TurnDecision, timestamp_ms: u64) {
        // an answered utterance leaves no turn text, so this arms nothing
        let unanswered = !self.session.transcript.turn_text().is_empty();
        if decision.grew || (self.session.cascade.is_none() && unanswered) {
            self.arm_cascade(timestamp_ms);
        }
        if self.session.config.finalize_policy == FinalizePolicy::Immediate {
            if let Some(cascade) = &self.session.cascade {
                debug!(
                    session_id = %self.session.id,
                    generation = cascade.generation(),
                    "final transcript, firing remaining stages now"
                );
                cascade.fast_forward();
            }
        }
    }

    /// Start a fresh cascade measured from now, superseding any armed one
    fn arm_cascade(&mut self, timestamp_ms: u64) {
        match self.session.state() {
            SessionState::Listening | SessionState::Pending => {}
            state => {
                debug!(session_id = %self.session.id, %state, "not arming cascade");
                return;
            }
        }

        let turn_text = self.session.transcript.turn_text();
        if turn_text.is_empty() {
            return;
        }

        // dropping the previous handle cancels its timers and calls
        self.session.cascade = None;
        self.session.cache.clear();
        self.session.in_pipeline = false;
        self.session.generation += 1;
        self.session.last_growth_timestamp_ms = Some(timestamp_ms);
        self.transition(SessionState::Pending);

        let config = &self.session.config;
        let schedule = CascadeSchedule::from_config(config, self.session.transcript.word_count());
        let cascade = Cascade {
            session_id: self.session.id.clone(),
            generation: self.session.generation,
            anchor: Instant::now(),
            schedule,
            transcript: self.transcript_tx.subscribe(),
            voice: config.voice.clone(),
            fallback_text: config.fallback_text.clone(),
            collaborators: self.collaborators.clone(),
            events: self.stage_tx.clone(),
        };

        debug!(
            session_id = %self.session.id,
            generation = self.session.generation,
            timestamp_ms,
            "cascade armed"
        );
        self.session.cascade = Some(cascade.spawn());
    }

    pub(super) async fn handle_stage(&mut self, message: StageMessage) {
        if message.generation != self.session.generation {
            debug!(
                session_id = %self.session.id,
                stale = message.generation,
                current = self.session.generation,
                "discarding stale stage event"
            );
            return;
        }

        let generation = message.generation;
        match message.event {
            StageEvent::GenerationStarted { transcript } => {
                debug!(session_id = %self.session.id, generation, %transcript, "generation in flight");
                self.session.in_pipeline = true;
            }
            StageEvent::Generated { response, failure } => {
                if let Some(failure) = failure {
                    self.publish(UiEvent::Error {
                        kind: ErrorKind::Generation,
                        message: failure.to_string(),
                    });
                }
                if self.session.in_pipeline {
                    self.session.cache.store_response(generation, response);
                }
            }
            StageEvent::SynthesisStarted => {
                debug!(session_id = %self.session.id, generation, "synthesis in flight");
            }
            StageEvent::Synthesized(audio) => {
                if self.session.in_pipeline {
                    self.session.cache.store_audio(generation, audio);
                }
            }
            StageEvent::SynthesisFailed(failure) => {
                self.publish(UiEvent::Error {
                    kind: ErrorKind::Synthesis,
                    message: failure.to_string(),
                });
            }
            StageEvent::DeliveryDue => self.deliver().await,
            StageEvent::PlaybackFinished(result) => self.on_playback_finished(result).await,
        }
    }

    /// T3: hand text to the UI and audio to the device
    async fn deliver(&mut self) {
        let generation = self.session.generation;
        self.session.cascade = None;

        let delivery = if self.session.in_pipeline {
            self.session.cache.take_for_delivery(generation)
        } else {
            None
        };
        self.session.in_pipeline = false;

        let Some((response, audio)) = delivery else {
            warn!(session_id = %self.session.id, generation, "delivery due without a response");
            self.session.cache.clear();
            self.transition(SessionState::Listening);
            return;
        };

        let record = TurnRecord {
            user_transcript: self.session.transcript.turn_text(),
            ai_text: response.text.clone(),
            ai_notes: response.notes.clone(),
            suggested_actions: response.suggestions.clone(),
        };
        self.session.transcript.mark_answered();
        self.transcript_tx
            .send_replace(self.session.transcript.turn_text());

        let text_ready = UiEvent::AiTextReady {
            text: response.text,
            suggestions: response.suggestions,
            artifact: response.artifact,
            generation,
        };

        match audio {
            Some(audio) => {
                self.device.acquire(&self.session.id).await;
                self.session.is_speaking = true;
                self.transition(SessionState::Speaking);
                self.publish(text_ready);
                self.publish(UiEvent::PlaybackStarted {
                    generation,
                    duration_ms: audio.clip.duration_ms,
                });
                self.start_playback(audio);
            }
            None => {
                info!(session_id = %self.session.id, generation, "delivering text only");
                self.publish(text_ready);
                self.transition(SessionState::Listening);
            }
        }

        self.persist(record);
    }

    fn start_playback(&mut self, audio: CachedAudio) {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let device = Arc::clone(&self.device);
        let events = self.stage_tx.clone();
        let generation = audio.generation;

        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = cancelled.cancelled() => return,
                result = device.play(&audio.clip) => result,
            };
            let _ = events.send(StageMessage {
                generation,
                event: StageEvent::PlaybackFinished(result),
            });
        });

        self.session.playback = Some(token.drop_guard());
    }

    async fn on_playback_finished(&mut self, result: Result<(), PlaybackError>) {
        let generation = self.session.generation;
        self.session.playback = None;
        self.session.is_speaking = false;
        self.device.release(&self.session.id).await;

        match result {
            Ok(()) => self.publish(UiEvent::PlaybackEnded { generation }),
            Err(e) => {
                warn!(session_id = %self.session.id, generation, error = %e, "playback failed");
                self.publish(UiEvent::Error {
                    kind: ErrorKind::Playback,
                    message: e.to_string(),
                });
            }
        }
        self.transition(SessionState::Listening);
    }

    async fn on_cancel(&mut self) {
        match self.session.state() {
            SessionState::Pending | SessionState::Speaking => {
                self.interrupt(InterruptReason::Cancelled).await;
                self.session.transcript.mark_answered();
                self.transcript_tx
                    .send_replace(self.session.transcript.turn_text());
            }
            state => debug!(session_id = %self.session.id, %state, "nothing to cancel"),
        }
    }

    /// Deactivation: drop all pending work and go idle
    async fn shut_down(&mut self) {
        self.reset_pipeline().await;
        self.transition(SessionState::Idle);
    }

    fn persist(&self, record: TurnRecord) {
        let store = Arc::clone(&self.collaborators.store);
        let session_id = self.session.id.clone();
        tokio::spawn(async move {
            if let Err(e) = store.persist(&session_id, record).await {
                warn!(%session_id, error = %e, "failed to persist turn");
            }
        });
    }

    pub(super) fn transition(&mut self, to: SessionState) {
        if let Err(e) = self.session.machine.transition_to(to) {
            warn!(session_id = %self.session.id, error = %e, "rejected state transition");
        }
    }

    pub(super) fn publish(&self, event: UiEvent) {
        let _ = self.ui.send(UiEnvelope {
            session_id: self.session.id.clone(),
            event,
        });
    }
}
