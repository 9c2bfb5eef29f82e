//! Per-workspace fan-out rooms with backpressure.
//!
//! Every workspace gets one room; every connected viewer gets an
//! independent receiver buffering up to `capacity` frames. Uses tokio
//! broadcast channels for O(1) send to all subscribers; a lagging viewer
//! drops frames rather than stalling the room.
//!
//! Rooms also hold the presence table for their workspace. Presence is
//! reconstructed entirely from heartbeats: an announce upserts an entry,
//! a depart removes it, and the sweep expires entries past the TTL. The
//! roster handed to viewers is always a full snapshot, never a diff.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use cadence_core::model::{PresenceStatus, PresenceUser};

use crate::protocol::{ServerFrame, WireError};

/// Statistics for monitoring room health.
#[derive(Debug, Clone, Default)]
pub struct RoomStats {
    pub frames_sent: u64,
    pub active_viewers: usize,
    pub presence_entries: usize,
}

/// A connected viewer of a workspace stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewer {
    pub user_id: Uuid,
    pub name: String,
}

/// Presence table entry, fed purely by heartbeats.
#[derive(Debug, Clone)]
struct PresenceEntry {
    name: String,
    board_id: Option<Uuid>,
    last_ping: u64,
}

/// Fan-out group plus presence table for one workspace.
pub struct WorkspaceRoom {
    workspace_id: Uuid,
    sender: broadcast::Sender<Arc<Vec<u8>>>,
    viewers: RwLock<HashMap<Uuid, Viewer>>,
    presence: RwLock<HashMap<Uuid, PresenceEntry>>,
    capacity: usize,
    // Lock-free on the send path.
    frames_sent: AtomicU64,
}

impl WorkspaceRoom {
    pub fn new(workspace_id: Uuid, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            workspace_id,
            sender,
            viewers: RwLock::new(HashMap::new()),
            presence: RwLock::new(HashMap::new()),
            capacity,
            frames_sent: AtomicU64::new(0),
        }
    }

    pub fn workspace_id(&self) -> Uuid {
        self.workspace_id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add a viewer and hand back its receiver.
    pub async fn add_viewer(&self, viewer: Viewer) -> broadcast::Receiver<Arc<Vec<u8>>> {
        let mut viewers = self.viewers.write().await;
        viewers.insert(viewer.user_id, viewer);
        self.sender.subscribe()
    }

    pub async fn remove_viewer(&self, user_id: &Uuid) -> Option<Viewer> {
        self.viewers.write().await.remove(user_id)
    }

    pub async fn viewer_count(&self) -> usize {
        self.viewers.read().await.len()
    }

    /// Fan a frame out to every viewer. Returns the receiver count.
    pub fn send_frame(&self, frame: &ServerFrame) -> Result<usize, WireError> {
        let encoded = frame.encode()?;
        Ok(self.send_raw(Arc::new(encoded)))
    }

    /// Pre-encoded fast path.
    pub fn send_raw(&self, encoded: Arc<Vec<u8>>) -> usize {
        let count = self.sender.send(encoded).unwrap_or(0);
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    // ── Presence table ───────────────────────────────────────────

    /// Upsert a heartbeat. Always marks the table changed — the stamp
    /// itself is part of the roster.
    pub async fn announce(
        &self,
        user_id: Uuid,
        name: String,
        board_id: Option<Uuid>,
        now_ms: u64,
    ) {
        self.presence.write().await.insert(
            user_id,
            PresenceEntry {
                name,
                board_id,
                last_ping: now_ms,
            },
        );
    }

    /// Explicit leave. Returns whether the entry existed.
    pub async fn depart(&self, user_id: &Uuid) -> bool {
        self.presence.write().await.remove(user_id).is_some()
    }

    /// Expire entries whose last heartbeat is older than `ttl`.
    /// Returns whether anything was removed.
    pub async fn sweep(&self, now_ms: u64, ttl: Duration) -> bool {
        let cutoff = now_ms.saturating_sub(ttl.as_millis() as u64);
        let mut presence = self.presence.write().await;
        let before = presence.len();
        presence.retain(|_, entry| entry.last_ping >= cutoff);
        presence.len() != before
    }

    /// Full roster snapshot, deterministic order, idleness derived from
    /// heartbeat age.
    pub async fn roster(&self, now_ms: u64, idle_after: Duration) -> Vec<PresenceUser> {
        let idle_cutoff = now_ms.saturating_sub(idle_after.as_millis() as u64);
        let presence = self.presence.read().await;
        let mut users: Vec<PresenceUser> = presence
            .iter()
            .map(|(user_id, entry)| PresenceUser {
                user_id: *user_id,
                name: entry.name.clone(),
                status: if entry.last_ping >= idle_cutoff {
                    PresenceStatus::Online
                } else {
                    PresenceStatus::Idle
                },
                last_ping: entry.last_ping,
            })
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then(a.user_id.cmp(&b.user_id)));
        users
    }

    /// Board ids currently being viewed, for diagnostics.
    pub async fn boards_in_view(&self) -> Vec<Uuid> {
        let presence = self.presence.read().await;
        let mut boards: Vec<Uuid> = presence.values().filter_map(|e| e.board_id).collect();
        boards.sort();
        boards.dedup();
        boards
    }

    pub async fn stats(&self) -> RoomStats {
        RoomStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            active_viewers: self.viewers.read().await.len(),
            presence_entries: self.presence.read().await.len(),
        }
    }
}

/// Directory of live rooms, keyed by workspace id.
pub struct RoomDirectory {
    rooms: RwLock<HashMap<Uuid, Arc<WorkspaceRoom>>>,
    default_capacity: usize,
}

impl RoomDirectory {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            default_capacity,
        }
    }

    pub async fn get_or_create(&self, workspace_id: Uuid) -> Arc<WorkspaceRoom> {
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(&workspace_id) {
                return room.clone();
            }
        }

        let mut rooms = self.rooms.write().await;
        // Double-check after taking the write lock.
        if let Some(room) = rooms.get(&workspace_id) {
            return room.clone();
        }
        let room = Arc::new(WorkspaceRoom::new(workspace_id, self.default_capacity));
        rooms.insert(workspace_id, room.clone());
        room
    }

    pub async fn get(&self, workspace_id: &Uuid) -> Option<Arc<WorkspaceRoom>> {
        self.rooms.read().await.get(workspace_id).cloned()
    }

    pub async fn remove_if_empty(&self, workspace_id: &Uuid) -> bool {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(workspace_id) {
            if room.viewer_count().await == 0 {
                rooms.remove(workspace_id);
                return true;
            }
        }
        false
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn all_rooms(&self) -> Vec<Arc<WorkspaceRoom>> {
        self.rooms.read().await.values().cloned().collect()
    }
}

// ===================================================================
// Tests
// ===================================================================
