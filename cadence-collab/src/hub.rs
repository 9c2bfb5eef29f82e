//! Workspace event hub: the push side of the sync loop.
//!
//! Architecture:
//! ```text
//! Session A ──┐
//!              ├── WorkspaceRoom (workspace_id) ── fan-out ──► all viewers
//! Session B ──┘        │
//!                      ├── presence table (heartbeat TTL)
//!                      │
//!                      ◄── MemoryStore updates (accepted replaces)
//! ```
//!
//! One subscription per workspace, not per board: a client switching
//! boards keeps its connection. The hub never pushes board state — a
//! `board-updated` frame carries only the id and stamp, and receivers
//! refetch the authoritative snapshot from the store.
//!
//! Presence is server-authoritative: announces upsert the table, departs
//! remove, and a periodic sweep expires entries whose heartbeats stopped
//! arriving (crashed tab, dropped link). Every change re-broadcasts the
//! full roster.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex, RwLock};

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::broadcast::{RoomDirectory, Viewer, WorkspaceRoom};
use crate::protocol::{now_ms, ClientFrame, ServerFrame, WorkspaceEvent};
use crate::store::StoreUpdate;

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Address to bind to.
    pub bind_addr: String,
    /// Broadcast channel capacity per room.
    pub broadcast_capacity: usize,
    /// Heartbeats older than this are expired by the sweep.
    pub presence_ttl: Duration,
    /// Heartbeats older than this mark the user idle.
    pub presence_idle_after: Duration,
    /// Interval between presence sweeps.
    pub sweep_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9390".to_string(),
            broadcast_capacity: 256,
            presence_ttl: Duration::from_secs(30),
            presence_idle_after: Duration::from_secs(18),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

/// Hub statistics.
#[derive(Debug, Clone, Default)]
pub struct HubStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_frames: u64,
    pub total_bytes: u64,
    pub active_rooms: usize,
}

/// The workspace event hub.
pub struct EventHub {
    config: HubConfig,
    rooms: Arc<RoomDirectory>,
    stats: Arc<RwLock<HubStats>>,
    /// Pending store-update subscription, consumed by `run`.
    store_updates: Mutex<Option<broadcast::Receiver<StoreUpdate>>>,
}

impl EventHub {
    pub fn new(config: HubConfig) -> Self {
        let rooms = Arc::new(RoomDirectory::new(config.broadcast_capacity));
        Self {
            config,
            rooms,
            stats: Arc::new(RwLock::new(HubStats::default())),
            store_updates: Mutex::new(None),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(HubConfig::default())
    }

    /// Bridge accepted store replaces into `board-updated` fan-out.
    pub async fn attach_store_updates(&self, rx: broadcast::Receiver<StoreUpdate>) {
        *self.store_updates.lock().await = Some(rx);
    }

    /// Run the accept loop. Call from an async runtime; runs until the
    /// listener fails.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("event hub listening on {}", self.config.bind_addr);

        self.spawn_sweeper();
        self.spawn_store_bridge().await;

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("new TCP connection from {addr}");

            let rooms = self.rooms.clone();
            let stats = self.stats.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, rooms, stats, config).await {
                    log::error!("connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Periodic presence sweep: expire stale heartbeats, re-broadcast the
    /// roster of any room that changed.
    fn spawn_sweeper(&self) {
        let rooms = self.rooms.clone();
        let ttl = self.config.presence_ttl;
        let idle_after = self.config.presence_idle_after;
        let interval = self.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let now = now_ms();
                for room in rooms.all_rooms().await {
                    if room.sweep(now, ttl).await {
                        log::debug!(
                            "presence sweep expired entries in workspace {}",
                            room.workspace_id()
                        );
                        broadcast_roster(&room, now, idle_after);
                    }
                }
            }
        });
    }

    /// Forward accepted store replaces to their workspace rooms.
    async fn spawn_store_bridge(&self) {
        let Some(mut rx) = self.store_updates.lock().await.take() else {
            return;
        };
        let rooms = self.rooms.clone();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(update) => {
                        if let Some(room) = rooms.get(&update.workspace_id).await {
                            let frame = ServerFrame::Event {
                                workspace_id: update.workspace_id,
                                event: update.event,
                            };
                            if let Err(e) = room.send_frame(&frame) {
                                log::warn!("store bridge encode failed: {e}");
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("store bridge lagged by {n} updates");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Handle a single viewer connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        rooms: Arc<RoomDirectory>,
        stats: Arc<RwLock<HubStats>>,
        config: HubConfig,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        log::info!("viewer connected from {addr}");
        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        // Per-connection state, established by the Subscribe frame.
        let mut user_id: Option<Uuid> = None;
        let mut workspace_id: Option<Uuid> = None;
        let mut room: Option<Arc<WorkspaceRoom>> = None;
        let mut room_rx: Option<broadcast::Receiver<Arc<Vec<u8>>>> = None;
        let mut announced = false;

        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => {
                            let bytes: Vec<u8> = data.into();
                            {
                                let mut s = stats.write().await;
                                s.total_frames += 1;
                                s.total_bytes += bytes.len() as u64;
                            }
                            let frame = match ClientFrame::decode(&bytes) {
                                Ok(frame) => frame,
                                Err(e) => {
                                    // Malformed frames are dropped, never fatal.
                                    log::warn!("dropping malformed frame from {addr}: {e}");
                                    continue;
                                }
                            };

                            match frame {
                                ClientFrame::Subscribe { workspace_id: ws_id, user_id: uid, name } => {
                                    user_id = Some(uid);
                                    workspace_id = Some(ws_id);

                                    let joined = rooms.get_or_create(ws_id).await;
                                    let rx = joined
                                        .add_viewer(Viewer { user_id: uid, name: name.clone() })
                                        .await;
                                    room_rx = Some(rx);

                                    // Presence is a full snapshot on every tick;
                                    // give the new viewer one immediately.
                                    let now = now_ms();
                                    let users = joined.roster(now, config.presence_idle_after).await;
                                    let frame = ServerFrame::Event {
                                        workspace_id: ws_id,
                                        event: WorkspaceEvent::Presence { users },
                                    };
                                    ws_sender.send(Message::Binary(frame.encode()?.into())).await?;

                                    {
                                        let mut s = stats.write().await;
                                        s.active_rooms = rooms.room_count().await;
                                    }
                                    room = Some(joined);
                                    log::info!("{name} ({uid}) subscribed to workspace {ws_id}");
                                }

                                ClientFrame::Announce { workspace_id: ws_id, board_id, user_id: uid, name } => {
                                    let target = match &room {
                                        Some(r) if r.workspace_id() == ws_id => r.clone(),
                                        _ => rooms.get_or_create(ws_id).await,
                                    };
                                    let now = now_ms();
                                    target.announce(uid, name, board_id, now).await;
                                    announced = true;
                                    broadcast_roster(&target, now, config.presence_idle_after);
                                    log::trace!("heartbeat from {uid} in workspace {ws_id}");
                                }

                                ClientFrame::Depart { workspace_id: ws_id, user_id: uid } => {
                                    if let Some(target) = rooms.get(&ws_id).await {
                                        if target.depart(&uid).await {
                                            let now = now_ms();
                                            broadcast_roster(&target, now, config.presence_idle_after);
                                        }
                                    }
                                    announced = false;
                                    log::info!("{uid} departed workspace {ws_id}");
                                }

                                ClientFrame::Publish { workspace_id: ws_id, event } => {
                                    if let Some(target) = rooms.get(&ws_id).await {
                                        log::debug!("publishing {} event to workspace {ws_id}", event.name());
                                        let frame = ServerFrame::Event { workspace_id: ws_id, event };
                                        if let Err(e) = target.send_frame(&frame) {
                                            log::warn!("publish encode failed: {e}");
                                        }
                                    }
                                }

                                ClientFrame::Ping => {
                                    ws_sender.send(Message::Binary(ServerFrame::Pong.encode()?.into())).await?;
                                }
                            }
                        }

                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("connection closed from {addr}");
                            break;
                        }

                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                        }

                        Some(Err(e)) => {
                            log::error!("websocket error from {addr}: {e}");
                            break;
                        }

                        _ => {}
                    }
                }

                frame = async {
                    match &mut room_rx {
                        Some(rx) => rx.recv().await,
                        // Not subscribed yet; wait for the Subscribe frame.
                        None => std::future::pending().await,
                    }
                } => {
                    match frame {
                        Ok(data) => {
                            ws_sender.send(Message::Binary(data.to_vec().into())).await?;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("viewer {user_id:?} lagged by {n} frames");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }

        // Teardown: drop viewer, drop presence if the leave frame was lost.
        if let (Some(uid), Some(ws_id), Some(joined)) = (user_id, workspace_id, &room) {
            joined.remove_viewer(&uid).await;
            if announced && joined.depart(&uid).await {
                broadcast_roster(joined, now_ms(), config.presence_idle_after);
            }
            if rooms.remove_if_empty(&ws_id).await {
                log::info!("room {ws_id} removed (empty)");
            }
        }

        {
            let mut s = stats.write().await;
            s.active_connections = s.active_connections.saturating_sub(1);
            s.active_rooms = rooms.room_count().await;
        }

        Ok(())
    }

    pub async fn stats(&self) -> HubStats {
        self.stats.read().await.clone()
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn rooms(&self) -> &Arc<RoomDirectory> {
        &self.rooms
    }
}

/// Fan the current roster out to a room. Fire-and-forget: a room with no
/// receivers is fine.
fn broadcast_roster(room: &Arc<WorkspaceRoom>, now_ms: u64, idle_after: Duration) {
    let room = room.clone();
    tokio::spawn(async move {
        let users = room.roster(now_ms, idle_after).await;
        let frame = ServerFrame::Event {
            workspace_id: room.workspace_id(),
            event: WorkspaceEvent::Presence { users },
        };
        if let Err(e) = room.send_frame(&frame) {
            log::warn!("roster encode failed: {e}");
        }
    });
}

// ===================================================================
// Tests
// ===================================================================
