//! Snapshot data model for workspaces, boards, and the event feeds.
//!
//! A `Board` is the complete, self-contained state of one task board at a
//! point in time. `last_updated` is the optimistic-concurrency marker: every
//! accepted mutation produces a strictly larger value, and any push event
//! carrying an older-or-equal stamp is ignored by the holder.
//!
//! Cards belong to exactly one column at a time. Moving a card is a
//! relationship update inside the snapshot, never a copy.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Client-side cap for the activity and notification feeds.
pub const FEED_CAP: usize = 50;

// ───────────────────────────────────────────────────────────────────
// Workspace
// ───────────────────────────────────────────────────────────────────

/// Billing tier of a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingTier {
    Free,
    Studio,
    Enterprise,
}

/// Role of a workspace member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberRole {
    Owner,
    Editor,
    Viewer,
}

/// A workspace member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: Uuid,
    pub name: String,
    pub role: MemberRole,
}

/// A workspace: the unit of membership, billing, and event distribution.
///
/// Workspaces are never deleted, only archived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub tier: BillingTier,
    /// Ordered member list (owner first by convention).
    pub members: Vec<Member>,
    pub boards: Vec<Board>,
    pub activity: Feed<ActivityEvent>,
    pub notifications: Feed<NotificationEvent>,
    pub receipts: Vec<UploadReceipt>,
    pub archived: bool,
}

impl Workspace {
    pub fn new(name: impl Into<String>, tier: BillingTier) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            tier,
            members: Vec::new(),
            boards: Vec::new(),
            activity: Feed::new(FEED_CAP),
            notifications: Feed::new(FEED_CAP),
            receipts: Vec::new(),
            archived: false,
        }
    }

    pub fn board(&self, board_id: Uuid) -> Option<&Board> {
        self.boards.iter().find(|b| b.id == board_id)
    }

    pub fn board_mut(&mut self, board_id: Uuid) -> Option<&mut Board> {
        self.boards.iter_mut().find(|b| b.id == board_id)
    }
}

// ───────────────────────────────────────────────────────────────────
// Board / Column / Card
// ───────────────────────────────────────────────────────────────────

/// Accent theme for a board or column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccentTheme {
    Aurora,
    Ember,
    Tide,
    Meadow,
}

impl Default for AccentTheme {
    fn default() -> Self {
        AccentTheme::Aurora
    }
}

/// Derived metrics summary for a board.
///
/// Always recomputed from the snapshot, never stored stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoardMetrics {
    pub columns: usize,
    pub cards: usize,
    /// Cards that carry at least one automation run.
    pub automated_cards: usize,
    /// Automation runs currently queued or running.
    pub runs_in_flight: usize,
}

/// A board snapshot: the complete state of one task board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub project_name: String,
    pub accent: AccentTheme,
    /// Ordered columns. Order is what the reorder engine preserves.
    pub columns: Vec<Column>,
    /// Optimistic-concurrency marker, milliseconds since the Unix epoch.
    /// Strictly increases across accepted mutations.
    pub last_updated: u64,
    pub archived: bool,
}

impl Board {
    pub fn new(workspace_id: Uuid, project_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            project_name: project_name.into(),
            accent: AccentTheme::default(),
            columns: Vec::new(),
            last_updated: 0,
            archived: false,
        }
    }

    pub fn column(&self, column_id: Uuid) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == column_id)
    }

    /// Locate a card anywhere on the board.
    pub fn find_card(&self, card_id: Uuid) -> Option<(&Column, &Card)> {
        self.columns.iter().find_map(|col| {
            col.cards
                .iter()
                .find(|card| card.id == card_id)
                .map(|card| (col, card))
        })
    }

    /// All card ids across all columns, in board order.
    pub fn card_ids(&self) -> Vec<Uuid> {
        self.columns
            .iter()
            .flat_map(|c| c.cards.iter().map(|card| card.id))
            .collect()
    }

    /// A card appears in at most one column. Holds for every snapshot
    /// produced by the mutation layer; checked directly in tests.
    pub fn cards_unique(&self) -> bool {
        let ids = self.card_ids();
        let mut seen = std::collections::HashSet::with_capacity(ids.len());
        ids.iter().all(|id| seen.insert(*id))
    }

    pub fn metrics(&self) -> BoardMetrics {
        let cards = self.columns.iter().map(|c| c.cards.len()).sum();
        let automated_cards = self
            .columns
            .iter()
            .flat_map(|c| &c.cards)
            .filter(|card| !card.automation.is_empty())
            .count();
        let runs_in_flight = self
            .columns
            .iter()
            .flat_map(|c| &c.cards)
            .flat_map(|card| &card.automation)
            .filter(|run| matches!(run.status, RunStatus::Queued | RunStatus::Running))
            .count();
        BoardMetrics {
            columns: self.columns.len(),
            cards,
            automated_cards,
            runs_in_flight,
        }
    }
}

/// An ordered column of cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: Uuid,
    pub title: String,
    pub accent: AccentTheme,
    pub cards: Vec<Card>,
}

impl Column {
    pub fn new(title: impl Into<String>, accent: AccentTheme) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            accent,
            cards: Vec::new(),
        }
    }
}

/// Mood tag on a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mood {
    Focus,
    Flow,
    Chill,
    Hype,
}

impl Default for Mood {
    fn default() -> Self {
        Mood::Focus
    }
}

/// State of a third-party integration attached to a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrationState {
    Connected,
    Syncing,
    Error,
}

/// Point-in-time status of one integration provider for a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationStatus {
    pub provider: String,
    pub state: IntegrationState,
    pub detail: Option<String>,
    pub checked_at: u64,
}

/// A card (goal). Belongs to exactly one column at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: Uuid,
    pub title: String,
    pub notes: String,
    pub mood: Mood,
    pub created_at: u64,
    pub assignee: Option<String>,
    pub due_date: Option<u64>,
    pub integrations: Vec<IntegrationStatus>,
    /// Append-only automation history, oldest first.
    pub automation: Vec<AutomationRun>,
}

impl Card {
    pub fn new(title: impl Into<String>, mood: Mood, created_at: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            notes: String::new(),
            mood,
            created_at,
            assignee: None,
            due_date: None,
            integrations: Vec::new(),
            automation: Vec::new(),
        }
    }

    /// The most recent run determines the visible automation badge.
    pub fn automation_badge(&self) -> Option<RunStatus> {
        self.automation.last().map(|run| run.status)
    }
}

// ───────────────────────────────────────────────────────────────────
// Presence
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresenceStatus {
    Online,
    Idle,
}

/// A user currently viewing a workspace, derived from recent heartbeats.
///
/// Ephemeral: never persisted beyond the hub's TTL, reconstructed entirely
/// from heartbeats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceUser {
    pub user_id: Uuid,
    pub name: String,
    pub status: PresenceStatus,
    pub last_ping: u64,
}

// ───────────────────────────────────────────────────────────────────
// Events & receipts
// ───────────────────────────────────────────────────────────────────

/// Immutable, append-only record of something that happened in a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: Uuid,
    pub actor: String,
    pub action: String,
    pub board_id: Option<Uuid>,
    pub at: u64,
}

impl ActivityEvent {
    pub fn new(actor: impl Into<String>, action: impl Into<String>, at: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor: actor.into(),
            action: action.into(),
            board_id: None,
            at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    Info,
    Warning,
    Error,
}

/// A user-facing notification. Dismissible; the newest one auto-dismisses
/// after a fixed delay on the consumer side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub at: u64,
}

impl NotificationEvent {
    pub fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<String>,
        at: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            title: title.into(),
            body: body.into(),
            at,
        }
    }
}

/// Receipt from the upload/CRC bridge. Rendered only; the transport lives
/// outside this engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub id: Uuid,
    pub file_name: String,
    pub bytes: u64,
    pub crc32: String,
    pub at: u64,
}

// ───────────────────────────────────────────────────────────────────
// Planner & automation
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One stage of a multi-stage automation plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStage {
    pub name: String,
    pub state: StageState,
}

/// Opaque continuation handle for a paused workflow.
///
/// Treated as an unconstructed binary blob: never parsed, only replayed
/// verbatim. `Debug` deliberately prints the length, not the contents.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeToken(Vec<u8>);

impl ResumeToken {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The raw bytes, for verbatim replay to the workflow engine.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Debug for ResumeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResumeToken({} bytes)", self.0.len())
    }
}

/// A long-running, stage-based automation plan attached to a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerPlan {
    pub goal_id: Uuid,
    pub workflow_id: Uuid,
    pub status: PlanStatus,
    pub stages: Vec<PlanStage>,
    pub resume_token: Option<ResumeToken>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// Telemetry for one tool invocation inside an automation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecution {
    pub name: String,
    pub capability: String,
    pub status: RunStatus,
    pub output: Option<String>,
    pub error: Option<String>,
}

/// One agent execution against a card. History is append-only per card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRun {
    pub agent_id: Uuid,
    pub agent_name: String,
    pub status: RunStatus,
    pub attempts: u32,
    pub tools: Vec<ToolExecution>,
}

// ───────────────────────────────────────────────────────────────────
// Bounded feed
// ───────────────────────────────────────────────────────────────────

/// Newest-first bounded feed. Oldest entries drop silently past the cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed<T> {
    entries: Vec<T>,
    cap: usize,
}

impl<T> Feed<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: Vec::new(),
            cap,
        }
    }

    /// Prepend an entry, dropping the oldest past the cap.
    pub fn prepend(&mut self, entry: T) {
        self.entries.insert(0, entry);
        self.entries.truncate(self.cap);
    }

    /// Newest first.
    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    pub fn newest(&self) -> Option<&T> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Remove the entry selected by the predicate, newest match first.
    pub fn remove_where<F: FnMut(&T) -> bool>(&mut self, mut pred: F) -> Option<T> {
        let idx = self.entries.iter().position(|e| pred(e))?;
        Some(self.entries.remove(idx))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ===================================================================
// Tests
// ===================================================================
