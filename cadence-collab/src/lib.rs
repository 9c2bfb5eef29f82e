//! # cadence-collab — Real-time sync layer for the Cadence task board
//!
//! Keeps a shared, ordered board consistent across many concurrently
//! connected clients using a last-writer-wins snapshot model with
//! push-based invalidation. Deliberately NOT a CRDT or OT engine: board
//! edits are human-paced, so the wire carries invalidation signals and the
//! store carries whole snapshots.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     WebSocket      ┌──────────────┐
//! │ WorkspaceStream◄──────────────────►│  EventHub    │
//! │ (per client) │    Binary Proto    │ (per deploy) │
//! └──────┬───────┘                    └──────┬───────┘
//!        │ events                            │ fan-out per workspace
//!        ▼                                   │ presence TTL sweep
//! ┌──────────────┐                           │
//! │ BoardSession │── replace ──► SnapshotStore ── accepted ──► invalidate
//! │ (local truth)│◄── refetch ──────┘
//! └──────────────┘
//! ```
//!
//! The session applies edits synchronously and persists behind the render.
//! A `board-updated` push is an invalidation, never a diff; the refetched
//! snapshot is the sole authority when clients collide.
//!
//! ## Modules
//!
//! - [`protocol`] — Binary wire protocol (bincode-encoded frames)
//! - [`store`] — Snapshot store contract + in-memory reference impl
//! - [`broadcast`] — Per-workspace fan-out rooms with presence tables
//! - [`hub`] — WebSocket event hub (the push side)
//! - [`stream`] — Event stream client with backoff reconnect
//! - [`session`] — Board session: optimistic mutations + reconciliation
//! - [`presence`] — Heartbeat manager + roster projection
//! - [`planner`] — Workflow plan bridge with opaque resume tokens

pub mod broadcast;
pub mod hub;
pub mod planner;
pub mod presence;
pub mod protocol;
pub mod session;
pub mod store;
pub mod stream;

// Re-exports for convenience
pub use broadcast::{RoomDirectory, RoomStats, Viewer, WorkspaceRoom};
pub use hub::{EventHub, HubConfig, HubStats};
pub use planner::{
    resume_plan, AssistApi, AssistError, AssistResponse, PlannerBridge, ResumeError, ResumeGate,
    WorkflowApi,
};
pub use presence::{HeartbeatConfig, HeartbeatManager, PresenceRoster, PresenceTransport};
pub use protocol::{now_ms, ClientFrame, ServerFrame, WireError, WorkspaceEvent};
pub use session::{
    AssistRequestError, BoardSession, MutateError, SessionConfig, SessionEvent,
};
pub use store::{MemoryStore, SnapshotStore, StoreError, StoreUpdate, WorkspaceSummary};
pub use stream::{
    ConnectionState, StreamConfig, StreamError, StreamEvent, WorkspaceStream,
};
