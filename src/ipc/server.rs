//! Unix domain socket server for IPC
//!
//! Provides request-response communication for session control and pushes
//! UI events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::session::{SessionError, SessionManager};

use super::protocol::{DaemonStatus, Notification, Request, Response};

/// Largest frame accepted from a client
const MAX_FRAME_LEN: usize = 1024 * 1024;

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
}

/// State every client handler sees
struct Shared {
    sessions: Arc<SessionManager>,
    start_time: Instant,
}

impl Server {
    /// Create a new IPC server bound to `socket_path`
    pub fn new(socket_path: &Path, sessions: Arc<SessionManager>) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            shared: Arc::new(Shared {
                sessions,
                start_time: Instant::now(),
            }),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let shared = Arc::clone(&self.shared);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = handle_client(stream, shared) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Handle a single client connection.
///
/// Frames are read on a separate task so a subscribed client can receive
/// notifications while the next request is still arriving.
async fn handle_client<S>(stream: S, shared: Arc<Shared>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (frame_tx, mut frame_rx) = mpsc::channel::<Vec<u8>>(16);

    let reader_task = tokio::spawn(async move {
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(frame)) => {
                    if frame_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("client disconnected");
                    break;
                }
                Err(e) => {
                    warn!(?e, "dropping client");
                    break;
                }
            }
        }
    });

    let mut ui_rx = shared.sessions.subscribe();
    let mut is_subscribed = false;

    let result = loop {
        tokio::select! {
            frame = frame_rx.recv() => {
                let Some(frame) = frame else {
                    break Ok(());
                };
                let response = match serde_json::from_slice::<Request>(&frame) {
                    Ok(request) => {
                        debug!(?request, "received request");
                        let (response, subscribe) = process_request(request, &shared).await;
                        if subscribe && !is_subscribed {
                            // only events from now on
                            ui_rx = shared.sessions.subscribe();
                            is_subscribed = true;
                            debug!("client subscribed to notifications");
                        }
                        response
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to parse request");
                        Response::error("bad_request", e.to_string())
                    }
                };
                if let Err(e) = send_message(&mut writer, &response).await {
                    break Err(e);
                }
            }
            event = ui_rx.recv(), if is_subscribed => match event {
                Ok(envelope) => {
                    if let Err(e) = send_message(&mut writer, &Notification::Ui(envelope)).await {
                        break Err(e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "notification receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    is_subscribed = false;
                }
            },
        }
    };

    reader_task.abort();
    result
}

/// Read one length-prefixed frame; `None` on a clean disconnect
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    // Read message length (4-byte little-endian)
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        bail!("message too large ({len} bytes)");
    }

    let mut msg_buf = vec![0u8; len];
    reader
        .read_exact(&mut msg_buf)
        .await
        .context("truncated message")?;
    Ok(Some(msg_buf))
}

/// Send a length-prefixed JSON message
async fn send_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;
    writer.flush().await?;

    Ok(())
}

/// Process a request and return a response
/// Returns (Response, should_subscribe)
async fn process_request(request: Request, shared: &Shared) -> (Response, bool) {
    let sessions = &shared.sessions;
    let response = match request {
        Request::Ping => Response::Pong,

        Request::GetStatus => Response::Status(DaemonStatus {
            uptime_secs: shared.start_time.elapsed().as_secs(),
            sessions: sessions.statuses().await,
            ..DaemonStatus::default()
        }),

        Request::Activate { session_id, config } => {
            match sessions.activate(session_id.clone(), config.as_ref()).await {
                Ok(_) => Response::Activated { session_id },
                Err(e) => session_error(e),
            }
        }

        Request::Deactivate { session_id } => match sessions.deactivate(&session_id).await {
            Ok(()) => Response::Deactivated { session_id },
            Err(e) => session_error(e),
        },

        Request::Transcript { session_id, event } => {
            accepted(sessions.push_transcript(&session_id, event).await)
        }

        Request::Cancel { session_id } => accepted(sessions.cancel(&session_id).await),

        Request::TranscriberFailed {
            session_id,
            message,
        } => accepted(sessions.transcriber_failed(&session_id, message).await),

        Request::Subscribe => return (Response::Subscribed, true),
    };
    (response, false)
}

fn accepted(result: Result<(), SessionError>) -> Response {
    match result {
        Ok(()) => Response::Accepted,
        Err(e) => session_error(e),
    }
}

fn session_error(e: SessionError) -> Response {
    debug!(error = %e, "session request failed");
    Response::error(e.code(), e.to_string())
}
