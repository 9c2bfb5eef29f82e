//! Binary wire protocol for the workspace event stream.
//!
//! Wire format: bincode-encoded frames over binary WebSocket messages.
//!
//! ```text
//! client ──► ClientFrame::Subscribe { workspace }        (once per stream)
//!        ──► ClientFrame::Announce  { workspace, board } (heartbeat)
//!        ──► ClientFrame::Depart    { workspace }        (best-effort leave)
//!        ──► ClientFrame::Publish   { workspace, event } (producers)
//!
//! server ──► ServerFrame::Event { workspace, event }
//!            where event ∈ { board-updated, activity, notification, presence }
//! ```
//!
//! A `board-updated` event is an invalidation signal, never a diff: it
//! carries only the board id and the new concurrency stamp, and the
//! receiver refetches the authoritative snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use cadence_core::model::{ActivityEvent, NotificationEvent, PresenceUser};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One of the four event types fanned out to every viewer of a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkspaceEvent {
    /// The named board changed server-side. Invalidation only — the
    /// payload is the new stamp, not the new state.
    BoardUpdated { board_id: Uuid, last_updated: u64 },
    /// Something happened; append to the activity feed.
    Activity(ActivityEvent),
    /// User-facing notice; append to the notification feed.
    Notification(NotificationEvent),
    /// Full presence roster. Replaces the previous roster wholesale.
    Presence { users: Vec<PresenceUser> },
}

impl WorkspaceEvent {
    /// Wire name of the event type, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BoardUpdated { .. } => "board-updated",
            Self::Activity(_) => "activity",
            Self::Notification(_) => "notification",
            Self::Presence { .. } => "presence",
        }
    }
}

/// Frames a client sends to the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientFrame {
    /// Join the workspace stream. First frame on every connection; one
    /// stream serves every board in the workspace.
    Subscribe {
        workspace_id: Uuid,
        user_id: Uuid,
        name: String,
    },
    /// Presence heartbeat for a workspace/board pair.
    Announce {
        workspace_id: Uuid,
        board_id: Option<Uuid>,
        user_id: Uuid,
        name: String,
    },
    /// Best-effort leave. The hub's TTL sweep is the authority when this
    /// is lost with a crashed client.
    Depart { workspace_id: Uuid, user_id: Uuid },
    /// Inject an event into the workspace fan-out (activity producers,
    /// automation telemetry, server-side bridges).
    Publish {
        workspace_id: Uuid,
        event: WorkspaceEvent,
    },
    Ping,
}

/// Frames the hub sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerFrame {
    Event {
        workspace_id: Uuid,
        event: WorkspaceEvent,
    },
    Pong,
}

impl ClientFrame {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| WireError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let (frame, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| WireError::Decode(e.to_string()))?;
        Ok(frame)
    }
}

impl ServerFrame {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| WireError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let (frame, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| WireError::Decode(e.to_string()))?;
        Ok(frame)
    }
}

/// Wire-level errors. A decode failure drops the frame; it never closes
/// the connection.
#[derive(Debug, Clone)]
pub enum WireError {
    Encode(String),
    Decode(String),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode(e) => write!(f, "encode error: {e}"),
            Self::Decode(e) => write!(f, "decode error: {e}"),
        }
    }
}

impl std::error::Error for WireError {}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::model::{NotificationKind, PresenceStatus};

    #[test]
    fn test_board_updated_roundtrip() {
        let frame = ServerFrame::Event {
            workspace_id: Uuid::new_v4(),
            event: WorkspaceEvent::BoardUpdated {
                board_id: Uuid::new_v4(),
                last_updated: 42,
            },
        };
        let encoded = frame.encode().unwrap();
        let decoded = ServerFrame::decode(&encoded).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn test_presence_event_roundtrip() {
        let users = vec![PresenceUser {
            user_id: Uuid::new_v4(),
            name: "Mira".into(),
            status: PresenceStatus::Online,
            last_ping: 1_000,
        }];
        let frame = ServerFrame::Event {
            workspace_id: Uuid::new_v4(),
            event: WorkspaceEvent::Presence { users },
        };
        let decoded = ServerFrame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn test_notification_event_roundtrip() {
        let frame = ClientFrame::Publish {
            workspace_id: Uuid::new_v4(),
            event: WorkspaceEvent::Notification(NotificationEvent::new(
                NotificationKind::Info,
                "Deploy",
                "staging is live",
                7,
            )),
        };
        let decoded = ClientFrame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn test_subscribe_roundtrip() {
        let frame = ClientFrame::Subscribe {
            workspace_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Mira".into(),
        };
        let decoded = ClientFrame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn test_decode_garbage_is_error_not_panic() {
        assert!(ServerFrame::decode(&[0xFF, 0xFE, 0xFD]).is_err());
        assert!(ClientFrame::decode(&[]).is_err());
    }

    #[test]
    fn test_event_names() {
        let ev = WorkspaceEvent::BoardUpdated {
            board_id: Uuid::new_v4(),
            last_updated: 0,
        };
        assert_eq!(ev.name(), "board-updated");
        assert_eq!(
            WorkspaceEvent::Presence { users: Vec::new() }.name(),
            "presence"
        );
    }
}
