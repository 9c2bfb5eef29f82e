//! Drag/reorder engine: pure ordering algebra for the board.
//!
//! Two operations cover every drag interaction:
//!
//! ```text
//! move_within   [A, B, C] + (A → C)          = [B, C, A]
//! move_across   Backlog[A,B,C] → Doing[]     = Backlog[B,C]  Doing[A]
//! ```
//!
//! Both are total and side-effect-free on invalid input: unknown ids leave
//! the lists exactly as they were. The global multiset of ids is preserved
//! by construction — an item is only ever removed when its insertion point
//! is already known.

use uuid::Uuid;

use crate::model::{Card, Column};

/// Anything addressable by a stable id inside an ordered list.
pub trait Keyed {
    fn key(&self) -> Uuid;
}

impl Keyed for Card {
    fn key(&self) -> Uuid {
        self.id
    }
}

impl Keyed for Column {
    fn key(&self) -> Uuid {
        self.id
    }
}

/// A keyed list of keyed items: the shape of a column holding cards.
pub trait KeyedList {
    type Item: Keyed;

    fn key(&self) -> Uuid;
    fn items(&self) -> &[Self::Item];
    fn items_mut(&mut self) -> &mut Vec<Self::Item>;
}

impl KeyedList for Column {
    type Item = Card;

    fn key(&self) -> Uuid {
        self.id
    }

    fn items(&self) -> &[Card] {
        &self.cards
    }

    fn items_mut(&mut self) -> &mut Vec<Card> {
        &mut self.cards
    }
}

/// Move `moved` so it occupies `target`'s position in the same list.
///
/// No-op (returns `false`) when either id is missing or when the item is
/// dropped onto itself.
pub fn move_within<T: Keyed>(items: &mut Vec<T>, moved: Uuid, target: Uuid) -> bool {
    if moved == target {
        return false;
    }
    let Some(from) = items.iter().position(|i| i.key() == moved) else {
        return false;
    };
    let Some(to) = items.iter().position(|i| i.key() == target) else {
        return false;
    };

    let item = items.remove(from);
    // `to` was computed before removal; clamp covers the tail insert.
    items.insert(to.min(items.len()), item);
    true
}

/// Move `moved` from the list keyed `source` into the list keyed `dest`,
/// in front of `before` — or appended to the end when `before` is `None`.
///
/// No-op (returns `false`) on any unknown id: source list, dest list, the
/// moved item within the source, or a `before` anchor missing from the
/// destination.
pub fn move_across<L: KeyedList>(
    lists: &mut [L],
    source: Uuid,
    dest: Uuid,
    moved: Uuid,
    before: Option<Uuid>,
) -> bool {
    if before == Some(moved) && source == dest {
        return false;
    }
    let Some(src_idx) = lists.iter().position(|l| l.key() == source) else {
        return false;
    };
    let Some(dst_idx) = lists.iter().position(|l| l.key() == dest) else {
        return false;
    };
    let Some(item_idx) = lists[src_idx]
        .items()
        .iter()
        .position(|i| i.key() == moved)
    else {
        return false;
    };

    if src_idx == dst_idx {
        // Same list: reuse one borrow for remove + reinsert.
        let list = lists[src_idx].items_mut();
        let insert_at = match before {
            Some(anchor) => match list.iter().position(|i| i.key() == anchor) {
                Some(pos) => pos,
                None => return false,
            },
            None => list.len(),
        };
        let item = list.remove(item_idx);
        let insert_at = if insert_at > item_idx {
            insert_at - 1
        } else {
            insert_at
        };
        list.insert(insert_at.min(list.len()), item);
        return true;
    }

    // Resolve the anchor before touching the source list, so a missing
    // anchor leaves everything untouched.
    let insert_at = match before {
        Some(anchor) => {
            match lists[dst_idx].items().iter().position(|i| i.key() == anchor) {
                Some(pos) => pos,
                None => return false,
            }
        }
        None => lists[dst_idx].items().len(),
    };

    let item = lists[src_idx].items_mut().remove(item_idx);
    lists[dst_idx].items_mut().insert(insert_at, item);
    true
}

// ===================================================================
// Tests
// ===================================================================
