use std::time::Duration;

use crate::config::{EngineConfig, EngineOverrides};
use crate::events::{ErrorKind, UiEvent};
use crate::pipeline::GeneratedResponse;
use crate::session::test_support::{
    assert_near, is_text_ready, GeneratorBehavior, Harness, RecordingPlayback,
    ScriptedGenerator, ScriptedSynthesizer,
};
use crate::session::{SessionError, SessionId};
use crate::state::SessionState;

#[tokio::test(start_paused = true)]
async fn test_generator_timeout_speaks_fallback() {
    let mut h = Harness::new(
        ScriptedGenerator::new(GeneratorBehavior::Hang),
        ScriptedSynthesizer::new(Duration::ZERO),
    );
    let s = h.activate("conv-e").await;
    let fallback = EngineConfig::default().fallback_text;

    h.say(&s, "what's the capital of peru", 0).await;

    let (at, event) = h
        .wait_for(|e| matches!(e, UiEvent::Error { .. }))
        .await;
    assert_near(at, 6500);
    assert_eq!(
        event,
        UiEvent::Error {
            kind: ErrorKind::Generation,
            message: "timed out".to_string(),
        }
    );

    let (at, event) = h.wait_for(is_text_ready).await;
    assert_near(at, 6500);
    match event {
        UiEvent::AiTextReady { text, suggestions, .. } => {
            assert_eq!(text, fallback);
            assert!(suggestions.is_empty());
        }
        other => panic!("unexpected {other}"),
    }

    let status = h.manager.status(s.id()).await.unwrap();
    assert_eq!(status.state, SessionState::Speaking);
    assert_eq!(h.synthesizer.calls()[0].1, fallback);
    assert_eq!(h.generator.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_generator_error_speaks_fallback_on_schedule() {
    let mut h = Harness::new(
        ScriptedGenerator::new(GeneratorBehavior::Fail(Duration::from_millis(100))),
        ScriptedSynthesizer::new(Duration::ZERO),
    );
    let s = h.activate("conv-err").await;

    h.say(&s, "order pizza", 0).await;
    let (at, event) = h.wait_for(is_text_ready).await;
    assert_near(at, 2000);
    match event {
        UiEvent::AiTextReady { text, .. } => {
            assert_eq!(text, EngineConfig::default().fallback_text)
        }
        other => panic!("unexpected {other}"),
    }

    // a recovered generator answers the next turn normally
    h.generator
        .set_behavior(GeneratorBehavior::Reply(Duration::ZERO));
    h.wait_for(|e| matches!(e, UiEvent::PlaybackEnded { .. }))
        .await;
    h.say(&s, "order pizza with olives", 3500).await;
    let (_, event) = h.wait_for(is_text_ready).await;
    match event {
        UiEvent::AiTextReady { text, .. } => assert_eq!(text, "reply: with olives"),
        other => panic!("unexpected {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_synthesis_failure_delivers_text_only() {
    let mut h = Harness::new(
        ScriptedGenerator::replying(Duration::ZERO),
        ScriptedSynthesizer::failing(),
    );
    let s = h.activate("conv-mute").await;

    h.say(&s, "how tall is everest", 0).await;
    let events = h.events_until(3500).await;

    let (at, event) = events
        .iter()
        .find(|(_, e)| matches!(e, UiEvent::Error { .. }))
        .unwrap();
    assert_near(*at, 1500);
    assert!(matches!(
        event,
        UiEvent::Error {
            kind: ErrorKind::Synthesis,
            ..
        }
    ));

    let (at, _) = events.iter().find(|(_, e)| is_text_ready(e)).unwrap();
    assert_near(*at, 2000);
    assert!(!events
        .iter()
        .any(|(_, e)| matches!(e, UiEvent::PlaybackStarted { .. })));
    assert!(h.playback.calls().is_empty());

    let status = h.manager.status(s.id()).await.unwrap();
    assert_eq!(status.state, SessionState::Listening);
    assert_eq!(h.store.records().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_synthesis_falls_back_to_text() {
    let mut h = Harness::new(
        ScriptedGenerator::replying(Duration::ZERO),
        ScriptedSynthesizer::new(Duration::from_secs(30)),
    );
    let s = h.activate("conv-slow-tts").await;

    h.say(&s, "tell me a long story", 0).await;
    let (at, _) = h.wait_for(is_text_ready).await;
    assert_near(at, 7000);
    assert_eq!(h.synthesizer.outstanding(), 0);

    let status = h.manager.status(s.id()).await.unwrap();
    assert_eq!(status.state, SessionState::Listening);
}

#[tokio::test(start_paused = true)]
async fn test_playback_failure_returns_to_listening() {
    let mut h = Harness::with_playback(
        ScriptedGenerator::replying(Duration::ZERO),
        ScriptedSynthesizer::new(Duration::ZERO),
        RecordingPlayback::failing(),
    );
    let s = h.activate("conv-speaker").await;

    h.say(&s, "what's new", 0).await;
    let (at, event) = h
        .wait_for(|e| matches!(e, UiEvent::Error { .. }))
        .await;
    assert_near(at, 2000);
    assert!(matches!(
        event,
        UiEvent::Error {
            kind: ErrorKind::Playback,
            ..
        }
    ));

    let status = h.manager.status(s.id()).await.unwrap();
    assert_eq!(status.state, SessionState::Listening);
    assert!(!status.is_speaking);
}

#[tokio::test(start_paused = true)]
async fn test_transcriber_failure_deactivates_session() {
    let mut h = Harness::instant();
    let s = h.activate("conv-mic").await;

    h.say(&s, "hello", 0).await;
    h.sleep_until_ms(700).await;
    s.transcriber_failed("microphone disconnected").await.unwrap();

    let (_, event) = h
        .wait_for(|e| matches!(e, UiEvent::Error { .. }))
        .await;
    assert_eq!(
        event,
        UiEvent::Error {
            kind: ErrorKind::Transcriber,
            message: "microphone disconnected".to_string(),
        }
    );

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(s.is_closed());
    assert!(matches!(
        h.manager.status(s.id()).await,
        Err(SessionError::Closed(_))
    ));
    assert!(h.events_until(5000).await.is_empty());

    // voice input can be turned back on
    let s = h.activate("conv-mic").await;
    let status = s.status().await.unwrap();
    assert_eq!(status.state, SessionState::Listening);
    assert_eq!(status.generation, 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_overrides_are_rejected() {
    let h = Harness::instant();
    let overrides = EngineOverrides {
        t2_ms: Some(100),
        ..Default::default()
    };
    let result = h
        .manager
        .activate(SessionId::new("conv-bad"), Some(&overrides))
        .await;
    match result {
        Err(e) => assert_eq!(e.code(), "invalid_config"),
        Ok(_) => panic!("expected invalid configuration"),
    }
    assert!(h.manager.statuses().await.is_empty());
}

#[test]
fn test_generated_response_defaults() {
    let response: GeneratedResponse = serde_json::from_str(r#"{"text":"ok"}"#).unwrap();
    assert!(response.suggestions.is_empty());
    assert!(response.artifact.is_none());
}
