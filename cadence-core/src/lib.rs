//! # cadence-core — Board domain model for Cadence
//!
//! Pure, I/O-free foundation of the collaborative task board: the snapshot
//! data model, the drag/reorder algorithms, the optimistic mutation
//! transforms, and the capability gate.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   BoardMutation   ┌──────────────┐
//! │ Board        │ ────────────────► │ Board'       │
//! │ (snapshot)   │    apply_at()     │ (snapshot)   │
//! └──────┬───────┘                   └──────────────┘
//!        │ columns/cards
//!        ▼
//! ┌──────────────┐
//! │ reorder      │  within-list & cross-list moves,
//! │ (pure)       │  total on unknown ids
//! └──────────────┘
//! ```
//!
//! Every mutation is a synchronous transform of an immutable snapshot:
//! old snapshot in, new snapshot out, with a strictly increasing
//! `last_updated` marker. Network concerns live in `cadence-collab`.
//!
//! ## Modules
//!
//! - [`model`] — Workspace/Board/Column/Card snapshot types
//! - [`reorder`] — Drag/reorder engine (pure list algebra)
//! - [`mutation`] — Optimistic mutation transforms
//! - [`capability`] — Tri-state capability gate

pub mod capability;
pub mod model;
pub mod mutation;
pub mod reorder;

// Re-exports for convenience
pub use capability::{caps, Availability, CapabilityError, CapabilityGate};
pub use model::{
    AccentTheme, ActivityEvent, AutomationRun, BillingTier, Board, BoardMetrics, Card, Column,
    Feed, IntegrationState, IntegrationStatus, Member, MemberRole, Mood, NotificationEvent,
    NotificationKind, PlanStage, PlanStatus, PlannerPlan, PresenceStatus, PresenceUser,
    ResumeToken, RunStatus, StageState, ToolExecution, UploadReceipt, Workspace, FEED_CAP,
};
pub use mutation::{apply_at, BoardMutation, CardPatch};
pub use reorder::{move_across, move_within, Keyed, KeyedList};
