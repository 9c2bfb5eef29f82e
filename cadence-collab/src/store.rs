//! Snapshot store contract and the in-memory reference implementation.
//!
//! The authoritative per-board state lives behind [`SnapshotStore`].
//! Replacement is whole-document: the client PUTs the full mutated
//! snapshot, never a patch. A replace carries the basis stamp the client
//! mutated from; the store rejects the replace when the stored stamp has
//! moved past it, so back-to-back conflicting replacements cannot silently
//! lose an update. The losing client converges through the push/refetch
//! cycle instead of rolling back.
//!
//! [`MemoryStore`] backs the hub and the tests. Every accepted replace is
//! published on its update channel so the hub can fan out the matching
//! `board-updated` invalidation.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use cadence_core::model::{BillingTier, Board, Workspace};

use crate::protocol::WorkspaceEvent;

/// Store failures.
#[derive(Debug, Clone)]
pub enum StoreError {
    WorkspaceNotFound(Uuid),
    BoardNotFound(Uuid),
    /// The caller's basis stamp no longer matches the stored snapshot.
    Conflict {
        board_id: Uuid,
        expected: u64,
        actual: u64,
    },
    /// Transport-level failure; retried by convergence, not by the caller.
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkspaceNotFound(id) => write!(f, "workspace {id} not found"),
            Self::BoardNotFound(id) => write!(f, "board {id} not found"),
            Self::Conflict {
                board_id,
                expected,
                actual,
            } => write!(
                f,
                "board {board_id} basis mismatch: replace based on {expected}, store holds {actual}"
            ),
            Self::Unavailable(e) => write!(f, "snapshot store unavailable: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Summary row for the workspace list.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceSummary {
    pub id: Uuid,
    pub name: String,
    pub tier: BillingTier,
    pub boards: usize,
    pub archived: bool,
}

/// Authoritative workspace/board persistence, consumed by sessions and
/// served by whatever backend the deployment uses.
pub trait SnapshotStore: Send + Sync + 'static {
    fn list_workspaces(
        &self,
    ) -> impl Future<Output = Result<Vec<WorkspaceSummary>, StoreError>> + Send;

    fn fetch_workspace(
        &self,
        workspace_id: Uuid,
    ) -> impl Future<Output = Result<Workspace, StoreError>> + Send;

    fn fetch_board(&self, board_id: Uuid)
        -> impl Future<Output = Result<Board, StoreError>> + Send;

    /// Whole-document replace, accepted only when `basis` equals the
    /// stored `last_updated`.
    fn replace_board(
        &self,
        board: Board,
        basis: u64,
    ) -> impl Future<Output = Result<Board, StoreError>> + Send;

    fn create_board(
        &self,
        workspace_id: Uuid,
        project_name: String,
    ) -> impl Future<Output = Result<Board, StoreError>> + Send;
}

/// An accepted change, published for invalidation fan-out.
#[derive(Debug, Clone)]
pub struct StoreUpdate {
    pub workspace_id: Uuid,
    pub event: WorkspaceEvent,
}

/// In-memory snapshot store.
pub struct MemoryStore {
    workspaces: RwLock<HashMap<Uuid, Workspace>>,
    updates: broadcast::Sender<StoreUpdate>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        let (updates, _) = broadcast::channel(256);
        Arc::new(Self {
            workspaces: RwLock::new(HashMap::new()),
            updates,
        })
    }

    /// Seed a workspace (provisioning is out of band for the engine).
    pub async fn insert_workspace(&self, workspace: Workspace) {
        self.workspaces
            .write()
            .await
            .insert(workspace.id, workspace);
    }

    /// Subscribe to accepted changes, for the hub's invalidation bridge.
    pub fn subscribe_updates(&self) -> broadcast::Receiver<StoreUpdate> {
        self.updates.subscribe()
    }

    fn publish(&self, workspace_id: Uuid, event: WorkspaceEvent) {
        // No receivers is fine: nothing to invalidate yet.
        let _ = self.updates.send(StoreUpdate {
            workspace_id,
            event,
        });
    }
}

impl SnapshotStore for MemoryStore {
    fn list_workspaces(
        &self,
    ) -> impl Future<Output = Result<Vec<WorkspaceSummary>, StoreError>> + Send {
        async move {
            let workspaces = self.workspaces.read().await;
            let mut rows: Vec<WorkspaceSummary> = workspaces
                .values()
                .map(|ws| WorkspaceSummary {
                    id: ws.id,
                    name: ws.name.clone(),
                    tier: ws.tier,
                    boards: ws.boards.len(),
                    archived: ws.archived,
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(rows)
        }
    }

    fn fetch_workspace(
        &self,
        workspace_id: Uuid,
    ) -> impl Future<Output = Result<Workspace, StoreError>> + Send {
        async move {
            self.workspaces
                .read()
                .await
                .get(&workspace_id)
                .cloned()
                .ok_or(StoreError::WorkspaceNotFound(workspace_id))
        }
    }

    fn fetch_board(
        &self,
        board_id: Uuid,
    ) -> impl Future<Output = Result<Board, StoreError>> + Send {
        async move {
            let workspaces = self.workspaces.read().await;
            workspaces
                .values()
                .find_map(|ws| ws.board(board_id))
                .cloned()
                .ok_or(StoreError::BoardNotFound(board_id))
        }
    }

    fn replace_board(
        &self,
        board: Board,
        basis: u64,
    ) -> impl Future<Output = Result<Board, StoreError>> + Send {
        async move {
            let mut workspaces = self.workspaces.write().await;
            let ws = workspaces
                .get_mut(&board.workspace_id)
                .ok_or(StoreError::WorkspaceNotFound(board.workspace_id))?;
            let stored = ws
                .board_mut(board.id)
                .ok_or(StoreError::BoardNotFound(board.id))?;

            if stored.last_updated != basis {
                return Err(StoreError::Conflict {
                    board_id: board.id,
                    expected: basis,
                    actual: stored.last_updated,
                });
            }

            *stored = board.clone();
            let (workspace_id, board_id, last_updated) =
                (board.workspace_id, board.id, board.last_updated);
            drop(workspaces);

            self.publish(
                workspace_id,
                WorkspaceEvent::BoardUpdated {
                    board_id,
                    last_updated,
                },
            );
            Ok(board)
        }
    }

    fn create_board(
        &self,
        workspace_id: Uuid,
        project_name: String,
    ) -> impl Future<Output = Result<Board, StoreError>> + Send {
        async move {
            let board = {
                let mut workspaces = self.workspaces.write().await;
                let ws = workspaces
                    .get_mut(&workspace_id)
                    .ok_or(StoreError::WorkspaceNotFound(workspace_id))?;
                let mut board = Board::new(workspace_id, project_name);
                board.last_updated = crate::protocol::now_ms();
                ws.boards.push(board.clone());
                board
            };
            self.publish(
                workspace_id,
                WorkspaceEvent::BoardUpdated {
                    board_id: board.id,
                    last_updated: board.last_updated,
                },
            );
            Ok(board)
        }
    }
}

// ===================================================================
// Tests
// ===================================================================
