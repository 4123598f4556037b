//! voice-turn-daemon: turn-taking and response orchestration for voice conversations
//!
//! This daemon runs one session per conversation and provides:
//! - Growth/refinement classification of streaming transcripts
//! - A three-stage response cascade (generate, synthesize, deliver)
//! - Barge-in handling with generation-tagged result invalidation
//! - IPC server for transcriber and UI clients
//!
//! The bundled adapters echo the transcript back and simulate speech; real
//! generators and audio backends plug in through the pipeline traits.

mod adapters;
mod config;
mod events;
mod ipc;
mod lifecycle;
mod pipeline;
mod session;
mod state;
mod turn;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::{EchoGenerator, JsonlConversationStore, TimedPlayback, WordRateSynthesizer};
use crate::config::Config;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::pipeline::Collaborators;
use crate::session::SessionManager;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "voice-turn-daemon starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        ?config.socket_path,
        t1_ms = config.engine.t1_ms,
        t2_ms = config.engine.t2_ms,
        t3_ms = config.engine.t3_ms,
        "configuration loaded"
    );

    let shutdown = ShutdownSignal::new();

    let store = Arc::new(JsonlConversationStore::new(&config.data_dir));
    let collaborators = Collaborators {
        generator: Arc::new(EchoGenerator::default()),
        synthesizer: Arc::new(WordRateSynthesizer::new()),
        context: store.clone(),
        store,
    };
    let sessions = Arc::new(SessionManager::new(
        config.engine.clone(),
        collaborators,
        Arc::new(TimedPlayback::new()),
    ));

    let server = Server::new(&config.socket_path, Arc::clone(&sessions))?;
    let mut ui_rx = sessions.subscribe();

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Mirror UI events into the log
        _ = async {
            loop {
                match ui_rx.recv().await {
                    Ok(envelope) => {
                        debug!(session_id = %envelope.session_id, event = %envelope.event, "ui event");
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "ui event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("ui event log exited");
        }

        // Wait for shutdown signal
        result = shutdown.wait() => {
            match result {
                Ok(signal) => info!(%signal, "shutdown signal received"),
                Err(e) => error!(?e, "failed to install signal handlers"),
            }
        }
    }

    // Cleanup
    info!("shutting down...");

    sessions.shutdown().await;
    server.shutdown().await;

    info!("voice-turn-daemon stopped");

    Ok(())
}
