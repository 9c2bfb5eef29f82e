//! Presence: heartbeat announcements out, roster projections in.
//!
//! ```text
//! enter board ──► HeartbeatManager ── announce ──► hub presence table
//!                     │ every 12s                      │ TTL sweep
//!                     └── leave on stop (best-effort)  ▼
//!                                               presence event
//!                                                      │
//! PresenceRoster ◄── replace wholesale ────────────────┘
//! ```
//!
//! The roster is a projection, not stored state: every `presence` event
//! replaces it completely, so there is no client-side expiry bookkeeping
//! to get wrong. The hub's heartbeat TTL is the authority for aging out
//! users whose leave signal was lost with a crashed client.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use cadence_core::model::{PresenceStatus, PresenceUser};

use crate::stream::{StreamError, WorkspaceStream};

/// Heartbeat cadence.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(12),
        }
    }
}

/// Transport for presence announcements. Mirrors the endpoint contract:
/// announce on entry/heartbeat, depart on leave.
pub trait PresenceTransport: Send + Sync + 'static {
    fn announce(
        &self,
        board_id: Option<Uuid>,
    ) -> impl Future<Output = Result<(), StreamError>> + Send;

    fn depart(&self) -> impl Future<Output = Result<(), StreamError>> + Send;
}

impl PresenceTransport for WorkspaceStream {
    fn announce(
        &self,
        board_id: Option<Uuid>,
    ) -> impl Future<Output = Result<(), StreamError>> + Send {
        WorkspaceStream::announce(self, board_id)
    }

    fn depart(&self) -> impl Future<Output = Result<(), StreamError>> + Send {
        WorkspaceStream::depart(self)
    }
}

/// Periodic liveness announcer for the current workspace/board pair.
///
/// Announces immediately on start and again on every interval tick and
/// board switch. Heartbeat failures are logged and dropped — liveness
/// never blocks an interaction path.
pub struct HeartbeatManager {
    board_tx: watch::Sender<Option<Uuid>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl HeartbeatManager {
    pub fn start<T: PresenceTransport>(
        transport: Arc<T>,
        board_id: Option<Uuid>,
        config: HeartbeatConfig,
    ) -> Self {
        let (board_tx, mut board_rx) = watch::channel(board_id);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        // Leave before the timer dies. Best-effort: the
                        // hub TTL covers us if this never arrives.
                        if let Err(e) = transport.depart().await {
                            log::debug!("depart failed: {e}");
                        }
                        break;
                    }
                    // First tick fires immediately: announce on entry.
                    _ = ticker.tick() => {
                        let board = *board_rx.borrow();
                        if let Err(e) = transport.announce(board).await {
                            log::debug!("heartbeat failed: {e}");
                        }
                    }
                    changed = board_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        // Board switch: announce right away, keep cadence.
                        let board = *board_rx.borrow();
                        if let Err(e) = transport.announce(board).await {
                            log::debug!("heartbeat failed: {e}");
                        }
                    }
                }
            }
        });

        Self {
            board_tx,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// Point the heartbeat at a different board (or none).
    pub fn set_board(&self, board_id: Option<Uuid>) {
        let _ = self.board_tx.send(board_id);
    }

    /// Send the leave signal and stop the timer.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for HeartbeatManager {
    fn drop(&mut self) {
        // Dropped without stop(): kill the timer. The depart is skipped,
        // which is exactly the crashed-tab case the hub TTL handles.
        if self.shutdown_tx.is_some() {
            if let Some(task) = &self.task {
                task.abort();
            }
        }
    }
}

/// Client-side presence view: replaced wholesale on every event.
#[derive(Debug, Clone, Default)]
pub struct PresenceRoster {
    users: Vec<PresenceUser>,
}

impl PresenceRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total replacement. An empty roster empties the view — nothing is
    /// merged with prior state.
    pub fn replace(&mut self, users: Vec<PresenceUser>) {
        self.users = users;
    }

    pub fn users(&self) -> &[PresenceUser] {
        &self.users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.users.iter().any(|u| u.user_id == user_id)
    }

    pub fn online_count(&self) -> usize {
        self.users
            .iter()
            .filter(|u| u.status == PresenceStatus::Online)
            .count()
    }
}

// ===================================================================
// Tests
// ===================================================================
