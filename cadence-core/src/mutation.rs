//! Optimistic mutation transforms.
//!
//! Every edit a user can make to a board is a [`BoardMutation`]. Applying
//! one is a pure function of the old snapshot and the mutation arguments:
//! the caller gets a new snapshot back synchronously, stores it as the new
//! local truth, and persists it in the background. Nothing here performs
//! I/O, so the local edit renders instantly.
//!
//! Applied mutations bump `last_updated` to `max(now, old + 1)` — strictly
//! increasing even when the wall clock stalls or steps backward. Mutations
//! that change nothing (unknown ids, rename to whitespace) leave the
//! snapshot byte-identical, timestamp included.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{AccentTheme, Board, Card, Column, Mood};
use crate::reorder;

/// One optimistic edit to a board snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoardMutation {
    AddColumn {
        title: String,
        accent: AccentTheme,
    },
    RemoveColumn {
        column_id: Uuid,
    },
    RenameColumn {
        column_id: Uuid,
        title: String,
    },
    AddCard {
        column_id: Uuid,
        card: Card,
    },
    UpdateCard {
        card_id: Uuid,
        patch: CardPatch,
    },
    RemoveCard {
        card_id: Uuid,
    },
    MoveCardWithinColumn {
        column_id: Uuid,
        card_id: Uuid,
        target_card_id: Uuid,
    },
    MoveCardToColumn {
        source_column_id: Uuid,
        target_column_id: Uuid,
        card_id: Uuid,
        before_card_id: Option<Uuid>,
    },
    MoveColumn {
        column_id: Uuid,
        target_column_id: Uuid,
    },
    SetProjectName {
        name: String,
    },
}

/// Partial update for a card. `None` leaves the field alone; the doubled
/// options on `assignee`/`due_date` distinguish "leave" from "clear".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CardPatch {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub mood: Option<Mood>,
    pub assignee: Option<Option<String>>,
    pub due_date: Option<Option<u64>>,
}

/// Apply a mutation to a snapshot at the given wall-clock instant.
///
/// Returns the new snapshot. When the mutation is a no-op the input is
/// returned unchanged, `last_updated` included.
pub fn apply_at(board: &Board, mutation: &BoardMutation, now_ms: u64) -> Board {
    let mut next = board.clone();
    let changed = match mutation {
        BoardMutation::AddColumn { title, accent } => {
            let title = title.trim();
            if title.is_empty() {
                false
            } else {
                next.columns.push(Column::new(title, *accent));
                true
            }
        }

        BoardMutation::RemoveColumn { column_id } => {
            let before = next.columns.len();
            next.columns.retain(|c| c.id != *column_id);
            next.columns.len() != before
        }

        BoardMutation::RenameColumn { column_id, title } => {
            rename(&mut next, *column_id, title)
        }

        BoardMutation::AddCard { column_id, card } => {
            match next.columns.iter_mut().find(|c| c.id == *column_id) {
                Some(col) => {
                    col.cards.push(card.clone());
                    true
                }
                None => false,
            }
        }

        BoardMutation::UpdateCard { card_id, patch } => patch_card(&mut next, *card_id, patch),

        BoardMutation::RemoveCard { card_id } => {
            let mut removed = false;
            for col in &mut next.columns {
                let before = col.cards.len();
                col.cards.retain(|c| c.id != *card_id);
                removed |= col.cards.len() != before;
            }
            removed
        }

        BoardMutation::MoveCardWithinColumn {
            column_id,
            card_id,
            target_card_id,
        } => match next.columns.iter_mut().find(|c| c.id == *column_id) {
            Some(col) => reorder::move_within(&mut col.cards, *card_id, *target_card_id),
            None => false,
        },

        BoardMutation::MoveCardToColumn {
            source_column_id,
            target_column_id,
            card_id,
            before_card_id,
        } => reorder::move_across(
            &mut next.columns,
            *source_column_id,
            *target_column_id,
            *card_id,
            *before_card_id,
        ),

        BoardMutation::MoveColumn {
            column_id,
            target_column_id,
        } => reorder::move_within(&mut next.columns, *column_id, *target_column_id),

        BoardMutation::SetProjectName { name } => {
            let name = name.trim();
            if name.is_empty() || name == next.project_name {
                false
            } else {
                next.project_name = name.to_string();
                true
            }
        }
    };

    if changed {
        next.last_updated = now_ms.max(board.last_updated + 1);
        next
    } else {
        board.clone()
    }
}

/// Rename with the whitespace rule: trim, and keep the previous title when
/// the trimmed result is empty. An empty title is never persisted.
fn rename(board: &mut Board, column_id: Uuid, title: &str) -> bool {
    let Some(col) = board.columns.iter_mut().find(|c| c.id == column_id) else {
        return false;
    };
    let title = title.trim();
    if title.is_empty() || title == col.title {
        return false;
    }
    col.title = title.to_string();
    true
}

fn patch_card(board: &mut Board, card_id: Uuid, patch: &CardPatch) -> bool {
    let Some(card) = board
        .columns
        .iter_mut()
        .flat_map(|c| c.cards.iter_mut())
        .find(|c| c.id == card_id)
    else {
        return false;
    };

    let mut changed = false;
    if let Some(title) = &patch.title {
        let title = title.trim();
        // Same whitespace rule as renames: empty keeps the prior title.
        if !title.is_empty() && title != card.title {
            card.title = title.to_string();
            changed = true;
        }
    }
    if let Some(notes) = &patch.notes {
        if *notes != card.notes {
            card.notes = notes.clone();
            changed = true;
        }
    }
    if let Some(mood) = patch.mood {
        if mood != card.mood {
            card.mood = mood;
            changed = true;
        }
    }
    if let Some(assignee) = &patch.assignee {
        if *assignee != card.assignee {
            card.assignee = assignee.clone();
            changed = true;
        }
    }
    if let Some(due) = &patch.due_date {
        if *due != card.due_date {
            card.due_date = *due;
            changed = true;
        }
    }
    changed
}

// ===================================================================
// Tests
// ===================================================================
