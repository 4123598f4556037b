//! Scripted collaborators and a paused-clock harness for session tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Notify};
use tokio::time::{sleep, sleep_until, timeout, timeout_at, Instant};

use crate::config::{EngineConfig, EngineOverrides, VoiceConfig};
use crate::events::{TurnRecord, UiEnvelope, UiEvent};
use crate::pipeline::{
    AudioClip, Collaborators, ContextError, ContextProvider, ConversationContext,
    ConversationStore, GeneratedResponse, GenerationError, PlaybackController, PlaybackError,
    ResponseGenerator, StoreError, SynthesisError, Synthesizer,
};
use crate::turn::TranscriptEvent;

use super::{SessionHandle, SessionId, SessionManager};

/// Clip length every scripted synthesis returns
pub const CLIP_MS: u64 = 1000;

pub fn assert_near(elapsed: Duration, expected_ms: u64) {
    let ms = elapsed.as_millis() as i128;
    assert!(
        (ms - expected_ms as i128).abs() <= 10,
        "expected ~{expected_ms}ms, got {ms}ms"
    );
}

/// Counts calls that are currently awaiting a result
#[derive(Default)]
struct InFlight {
    now: AtomicUsize,
    max: AtomicUsize,
}

struct InFlightGuard<'a>(&'a InFlight);

impl InFlight {
    fn enter(&self) -> InFlightGuard<'_> {
        let now = self.now.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(self)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.now.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy)]
pub enum GeneratorBehavior {
    Reply(Duration),
    Fail(Duration),
    Hang,
}

/// Generator answering "reply: <transcript>" after a scripted delay
pub struct ScriptedGenerator {
    behavior: Mutex<GeneratorBehavior>,
    in_flight: InFlight,
    calls: Mutex<Vec<(Instant, String)>>,
}

impl ScriptedGenerator {
    pub fn new(behavior: GeneratorBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            in_flight: InFlight::default(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(delay: Duration) -> Self {
        Self::new(GeneratorBehavior::Reply(delay))
    }

    pub fn set_behavior(&self, behavior: GeneratorBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn calls(&self) -> Vec<(Instant, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn outstanding(&self) -> usize {
        self.in_flight.now.load(Ordering::SeqCst)
    }

    pub fn max_outstanding(&self) -> usize {
        self.in_flight.max.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResponseGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        _context: &ConversationContext,
        transcript: &str,
    ) -> Result<GeneratedResponse, GenerationError> {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), transcript.to_string()));
        let behavior = *self.behavior.lock().unwrap();
        let _guard = self.in_flight.enter();

        match behavior {
            GeneratorBehavior::Reply(delay) => {
                sleep(delay).await;
                Ok(GeneratedResponse {
                    text: format!("reply: {transcript}"),
                    suggestions: vec!["tell me more".to_string()],
                    artifact: None,
                    notes: Some("scripted".to_string()),
                })
            }
            GeneratorBehavior::Fail(delay) => {
                sleep(delay).await;
                Err(GenerationError::Failed("model unavailable".to_string()))
            }
            GeneratorBehavior::Hang => std::future::pending().await,
        }
    }
}

/// Synthesizer returning a `CLIP_MS` clip whose handle is the text
pub struct ScriptedSynthesizer {
    delay: Duration,
    fail: AtomicBool,
    in_flight: InFlight,
    calls: Mutex<Vec<(Instant, String)>>,
}

impl ScriptedSynthesizer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail: AtomicBool::new(false),
            in_flight: InFlight::default(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        let synthesizer = Self::new(Duration::ZERO);
        synthesizer.fail.store(true, Ordering::SeqCst);
        synthesizer
    }

    pub fn calls(&self) -> Vec<(Instant, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn outstanding(&self) -> usize {
        self.in_flight.now.load(Ordering::SeqCst)
    }

    pub fn max_outstanding(&self) -> usize {
        self.in_flight.max.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Synthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, text: &str, _voice: &VoiceConfig) -> Result<AudioClip, SynthesisError> {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), text.to_string()));
        let _guard = self.in_flight.enter();

        sleep(self.delay).await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(SynthesisError::Failed("voice unavailable".to_string()));
        }
        Ok(AudioClip {
            handle: text.to_string(),
            bytes: Vec::new(),
            duration_ms: CLIP_MS,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackCall {
    Play(String),
    Stop,
}

/// Playback that lasts the clip's duration unless stopped
#[derive(Default)]
pub struct RecordingPlayback {
    timeline: Mutex<Vec<(Instant, PlaybackCall)>>,
    fail: AtomicBool,
    stopped: Notify,
}

impl RecordingPlayback {
    pub fn failing() -> Self {
        let playback = Self::default();
        playback.fail.store(true, Ordering::SeqCst);
        playback
    }

    pub fn calls(&self) -> Vec<PlaybackCall> {
        self.timeline()
            .into_iter()
            .map(|(_, call)| call)
            .collect()
    }

    pub fn timeline(&self) -> Vec<(Instant, PlaybackCall)> {
        self.timeline.lock().unwrap().clone()
    }

    fn record(&self, call: PlaybackCall) {
        self.timeline.lock().unwrap().push((Instant::now(), call));
    }
}

#[async_trait]
impl PlaybackController for RecordingPlayback {
    async fn play(&self, clip: &AudioClip) -> Result<(), PlaybackError> {
        self.record(PlaybackCall::Play(clip.handle.clone()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(PlaybackError("output device unavailable".to_string()));
        }
        tokio::select! {
            _ = sleep(Duration::from_millis(clip.duration_ms)) => {}
            _ = self.stopped.notified() => {}
        }
        Ok(())
    }

    async fn stop(&self) {
        self.record(PlaybackCall::Stop);
        self.stopped.notify_waiters();
    }
}

/// In-memory conversation store that also serves context
#[derive(Default)]
pub struct RecordingStore {
    records: Mutex<Vec<(SessionId, TurnRecord)>>,
}

impl RecordingStore {
    pub fn records(&self) -> Vec<(SessionId, TurnRecord)> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversationStore for RecordingStore {
    async fn persist(&self, session_id: &SessionId, record: TurnRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .unwrap()
            .push((session_id.clone(), record));
        Ok(())
    }
}

#[async_trait]
impl ContextProvider for RecordingStore {
    async fn assemble_context(&self, session_id: &SessionId) -> Result<ConversationContext, ContextError> {
        let recent_turns = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == session_id)
            .map(|(_, record)| record.clone())
            .collect();
        Ok(ConversationContext {
            session_id: session_id.to_string(),
            recent_turns,
        })
    }
}

pub fn collaborators(
    generator: Arc<ScriptedGenerator>,
    synthesizer: Arc<ScriptedSynthesizer>,
) -> (Collaborators, Arc<RecordingStore>) {
    let store = Arc::new(RecordingStore::default());
    let collaborators = Collaborators {
        generator,
        synthesizer,
        context: store.clone(),
        store: store.clone(),
    };
    (collaborators, store)
}

/// A session manager wired to scripted collaborators, with a UI tap.
///
/// Tests run on a paused clock; `started` is time zero for every
/// `*_ms` argument and every elapsed value returned.
pub struct Harness {
    pub manager: SessionManager,
    pub generator: Arc<ScriptedGenerator>,
    pub synthesizer: Arc<ScriptedSynthesizer>,
    pub playback: Arc<RecordingPlayback>,
    pub store: Arc<RecordingStore>,
    pub ui: broadcast::Receiver<UiEnvelope>,
    pub started: Instant,
}

impl Harness {
    pub fn new(generator: ScriptedGenerator, synthesizer: ScriptedSynthesizer) -> Self {
        Self::with_playback(generator, synthesizer, RecordingPlayback::default())
    }

    pub fn with_playback(
        generator: ScriptedGenerator,
        synthesizer: ScriptedSynthesizer,
        playback: RecordingPlayback,
    ) -> Self {
        let generator = Arc::new(generator);
        let synthesizer = Arc::new(synthesizer);
        let playback = Arc::new(playback);
        let (collaborators, store) = collaborators(generator.clone(), synthesizer.clone());
        let manager = SessionManager::new(EngineConfig::default(), collaborators, playback.clone());
        let ui = manager.subscribe();
        Self {
            manager,
            generator,
            synthesizer,
            playback,
            store,
            ui,
            started: Instant::now(),
        }
    }

    /// Both collaborators answer instantly
    pub fn instant() -> Self {
        Self::new(
            ScriptedGenerator::replying(Duration::ZERO),
            ScriptedSynthesizer::new(Duration::ZERO),
        )
    }

    pub async fn activate(&self, id: &str) -> SessionHandle {
        self.manager.activate(SessionId::new(id), None).await.unwrap()
    }

    pub async fn activate_with(&self, id: &str, overrides: EngineOverrides) -> SessionHandle {
        self.manager
            .activate(SessionId::new(id), Some(&overrides))
            .await
            .unwrap()
    }

    pub fn at(&self, ms: u64) -> Instant {
        self.started + Duration::from_millis(ms)
    }

    pub async fn sleep_until_ms(&self, ms: u64) {
        sleep_until(self.at(ms)).await;
    }

    /// Push a partial transcript at `ms`
    pub async fn say(&self, handle: &SessionHandle, text: &str, ms: u64) {
        self.sleep_until_ms(ms).await;
        handle
            .push_transcript(TranscriptEvent::partial(text, ms))
            .await
            .unwrap();
    }

    /// Push a final transcript at `ms`
    pub async fn say_final(&self, handle: &SessionHandle, text: &str, ms: u64) {
        self.sleep_until_ms(ms).await;
        handle
            .push_transcript(TranscriptEvent::final_(text, ms))
            .await
            .unwrap();
    }

    /// Next UI event with the time it was observed
    pub async fn next_event(&mut self) -> (Duration, SessionId, UiEvent) {
        let envelope = timeout(Duration::from_secs(120), self.ui.recv())
            .await
            .expect("no UI event within 120s")
            .expect("UI channel closed");
        (self.started.elapsed(), envelope.session_id, envelope.event)
    }

    /// Skip events until one matches
    pub async fn wait_for(&mut self, matches: impl Fn(&UiEvent) -> bool) -> (Duration, UiEvent) {
        loop {
            let (at, _, event) = self.next_event().await;
            if matches(&event) {
                return (at, event);
            }
        }
    }

    /// Collect every event published until `ms`
    pub async fn events_until(&mut self, ms: u64) -> Vec<(Duration, UiEvent)> {
        let deadline = self.at(ms);
        let mut events = Vec::new();
        while let Ok(Ok(envelope)) = timeout_at(deadline, self.ui.recv()).await {
            events.push((self.started.elapsed(), envelope.event));
        }
        events
    }
}

pub fn is_text_ready(event: &UiEvent) -> bool {
    matches!(event, UiEvent::AiTextReady { .. })
}

pub fn is_interrupted(event: &UiEvent) -> bool {
    matches!(event, UiEvent::Interrupted { .. })
}
