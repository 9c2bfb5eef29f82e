//! Workspace event stream client.
//!
//! Maintains one persistent push channel per active workspace and decodes
//! the typed events flowing over it. The connection lifecycle is
//!
//! ```text
//! connecting → open → (message)* → closed|error
//!     ▲                                 │
//!     └────────── backoff ──────────────┘
//! ```
//!
//! Reconnects are silent; after `degraded_after` consecutive failed
//! attempts a single `Degraded` event is emitted so the consumer can show
//! a degraded-mode notice, and reconnection keeps going regardless. The
//! backoff is exponential with deterministic jitter — it never busy-loops.
//!
//! Switching the active board does not touch the connection: the stream
//! belongs to the workspace, not the board.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify, RwLock};

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::protocol::{ClientFrame, ServerFrame, WireError, WorkspaceEvent};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Events emitted to the stream consumer.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Connected,
    Disconnected,
    /// Reconnect attempts crossed the degraded threshold.
    Degraded { attempts: u32 },
    /// A demultiplexed workspace event.
    Workspace(WorkspaceEvent),
}

/// Reconnect policy.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Consecutive failed attempts before a `Degraded` event.
    pub degraded_after: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_millis(250),
            backoff_cap: Duration::from_secs(30),
            degraded_after: 8,
        }
    }
}

/// Exponential backoff with deterministic ±25% jitter keyed off the
/// attempt counter. Attempt 1 waits ~base, doubling up to the cap.
pub(crate) fn backoff_delay(attempt: u32, config: &StreamConfig) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    let raw = config.backoff_base.saturating_mul(1u32 << shift);
    let capped = raw.min(config.backoff_cap);
    let salt = attempt.wrapping_mul(2_654_435_761) % 512;
    let factor = 0.75 + (salt as f64 / 512.0) * 0.5;
    capped.mul_f64(factor)
}

/// Stream-side failures. Sends are best-effort; callers that can tolerate
/// loss (heartbeats) just drop the error.
#[derive(Debug, Clone)]
pub enum StreamError {
    NotConnected,
    Wire(WireError),
    ChannelClosed,
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "stream not connected"),
            Self::Wire(e) => write!(f, "wire error: {e}"),
            Self::ChannelClosed => write!(f, "outgoing channel closed"),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<WireError> for StreamError {
    fn from(e: WireError) -> Self {
        Self::Wire(e)
    }
}

/// The workspace stream client.
pub struct WorkspaceStream {
    workspace_id: Uuid,
    user_id: Uuid,
    user_name: String,
    server_url: String,
    config: StreamConfig,

    state: Arc<RwLock<ConnectionState>>,
    /// Sender into the live connection's writer task; refreshed per
    /// connection, `None` while down.
    outgoing: Arc<RwLock<Option<mpsc::Sender<Vec<u8>>>>>,
    event_tx: mpsc::Sender<StreamEvent>,
    event_rx: Option<mpsc::Receiver<StreamEvent>>,
    stopping: Arc<AtomicBool>,
    stop_notify: Arc<Notify>,
}

impl WorkspaceStream {
    pub fn new(
        workspace_id: Uuid,
        user_id: Uuid,
        user_name: impl Into<String>,
        server_url: impl Into<String>,
    ) -> Self {
        Self::with_config(
            workspace_id,
            user_id,
            user_name,
            server_url,
            StreamConfig::default(),
        )
    }

    pub fn with_config(
        workspace_id: Uuid,
        user_id: Uuid,
        user_name: impl Into<String>,
        server_url: impl Into<String>,
        config: StreamConfig,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            workspace_id,
            user_id,
            user_name: user_name.into(),
            server_url: server_url.into(),
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing: Arc::new(RwLock::new(None)),
            event_tx,
            event_rx: Some(event_rx),
            stopping: Arc::new(AtomicBool::new(false)),
            stop_notify: Arc::new(Notify::new()),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<StreamEvent>> {
        self.event_rx.take()
    }

    /// Start the connection supervisor. Dials, subscribes, dispatches,
    /// and silently reconnects with backoff until `shutdown`.
    pub fn start(&self) {
        let workspace_id = self.workspace_id;
        let user_id = self.user_id;
        let user_name = self.user_name.clone();
        let url = self.server_url.clone();
        let config = self.config.clone();
        let state = self.state.clone();
        let outgoing = self.outgoing.clone();
        let event_tx = self.event_tx.clone();
        let stopping = self.stopping.clone();
        let stop_notify = self.stop_notify.clone();

        tokio::spawn(async move {
            let mut attempts: u32 = 0;

            loop {
                if stopping.load(Ordering::SeqCst) {
                    break;
                }

                *state.write().await = if attempts == 0 {
                    ConnectionState::Connecting
                } else {
                    ConnectionState::Reconnecting
                };

                match tokio_tungstenite::connect_async(&url).await {
                    Ok((ws_stream, _)) => {
                        attempts = 0;
                        let (mut ws_writer, mut ws_reader) = ws_stream.split();

                        // Writer task: drain the outgoing channel.
                        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(256);
                        let writer = tokio::spawn(async move {
                            while let Some(data) = out_rx.recv().await {
                                if ws_writer.send(Message::Binary(data.into())).await.is_err() {
                                    break;
                                }
                            }
                        });
                        *outgoing.write().await = Some(out_tx.clone());

                        // First frame on every connection: subscribe the
                        // workspace. Boards never reconnect the stream.
                        let subscribe = ClientFrame::Subscribe {
                            workspace_id,
                            user_id,
                            name: user_name.clone(),
                        };
                        if let Ok(encoded) = subscribe.encode() {
                            let _ = out_tx.send(encoded).await;
                        }

                        *state.write().await = ConnectionState::Connected;
                        let _ = event_tx.send(StreamEvent::Connected).await;
                        log::info!("stream open for workspace {workspace_id}");

                        // Dispatch until the connection drops.
                        loop {
                            tokio::select! {
                                msg = ws_reader.next() => {
                                    match msg {
                                        Some(Ok(Message::Binary(data))) => {
                                            let bytes: Vec<u8> = data.into();
                                            match ServerFrame::decode(&bytes) {
                                                Ok(ServerFrame::Event { workspace_id: ws_id, event }) => {
                                                    if ws_id != workspace_id {
                                                        log::debug!("dropping event for foreign workspace {ws_id}");
                                                        continue;
                                                    }
                                                    log::trace!("stream event: {}", event.name());
                                                    let _ = event_tx.send(StreamEvent::Workspace(event)).await;
                                                }
                                                Ok(ServerFrame::Pong) => {}
                                                Err(e) => {
                                                    // Malformed payloads are dropped for
                                                    // diagnostics, never fatal to the stream.
                                                    log::warn!("dropping malformed frame: {e}");
                                                }
                                            }
                                        }
                                        Some(Ok(Message::Close(_))) | None => break,
                                        Some(Err(e)) => {
                                            log::warn!("stream error: {e}");
                                            break;
                                        }
                                        _ => {}
                                    }
                                }
                                _ = stop_notify.notified() => break,
                            }
                            if stopping.load(Ordering::SeqCst) {
                                break;
                            }
                        }

                        *outgoing.write().await = None;
                        writer.abort();
                        *state.write().await = ConnectionState::Disconnected;
                        let _ = event_tx.send(StreamEvent::Disconnected).await;
                    }
                    Err(e) => {
                        log::debug!("connect to {url} failed: {e}");
                    }
                }

                if stopping.load(Ordering::SeqCst) {
                    break;
                }

                attempts += 1;
                if attempts == config.degraded_after {
                    let _ = event_tx.send(StreamEvent::Degraded { attempts }).await;
                    log::warn!(
                        "workspace {workspace_id} stream degraded after {attempts} attempts"
                    );
                }

                let delay = backoff_delay(attempts, &config);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stop_notify.notified() => break,
                }
            }

            *state.write().await = ConnectionState::Disconnected;
        });
    }

    /// Stop the supervisor and close the connection.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.stop_notify.notify_waiters();
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn workspace_id(&self) -> Uuid {
        self.workspace_id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    async fn send_frame(&self, frame: &ClientFrame) -> Result<(), StreamError> {
        let encoded = frame.encode()?;
        let outgoing = self.outgoing.read().await;
        let tx = outgoing.as_ref().ok_or(StreamError::NotConnected)?;
        tx.send(encoded)
            .await
            .map_err(|_| StreamError::ChannelClosed)
    }

    /// Presence heartbeat for the current workspace/board pair.
    pub async fn announce(&self, board_id: Option<Uuid>) -> Result<(), StreamError> {
        self.send_frame(&ClientFrame::Announce {
            workspace_id: self.workspace_id,
            board_id,
            user_id: self.user_id,
            name: self.user_name.clone(),
        })
        .await
    }

    /// Best-effort explicit leave.
    pub async fn depart(&self) -> Result<(), StreamError> {
        self.send_frame(&ClientFrame::Depart {
            workspace_id: self.workspace_id,
            user_id: self.user_id,
        })
        .await
    }

    /// Inject an event into the workspace fan-out.
    pub async fn publish(&self, event: WorkspaceEvent) -> Result<(), StreamError> {
        self.send_frame(&ClientFrame::Publish {
            workspace_id: self.workspace_id,
            event,
        })
        .await
    }

    pub async fn ping(&self) -> Result<(), StreamError> {
        self.send_frame(&ClientFrame::Ping).await
    }
}

// ===================================================================
// Tests
// ===================================================================
