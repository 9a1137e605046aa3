//! Order reconciliation for drag-and-drop sequences.
//!
//! DESIGN
//! ======
//! Turns a drag gesture (move item at `from_index` to `to_index`, possibly
//! across containers) into the full set of new order values for the affected
//! container(s). Pure arithmetic over in-memory slices, with no I/O and no
//! clocks, so the server (authoritative reindex before persisting) and the
//! client (optimistic local reindex) run the exact same code.
//!
//! TRADE-OFFS
//! ==========
//! Every move densely reindexes the whole container to `0..N-1` rather than
//! computing a minimal diff. All N rows are rewritten per move, but order
//! values can never collide or drift, and readers sorting ascending always
//! see the user-intended sequence.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// TYPES
// =============================================================================

/// One item of an orderable collection as currently stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedItem {
    pub id: Uuid,
    pub order: i64,
}

impl OrderedItem {
    #[must_use]
    pub fn new(id: Uuid, order: i64) -> Self {
        Self { id, order }
    }
}

/// New order value for one item. The container is carried by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPosition {
    pub id: Uuid,
    pub order: i64,
}

/// Result of a cross-container move: both containers densely reindexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossMove {
    /// Remaining source items, reindexed `0..N-1`.
    pub source: Vec<ItemPosition>,
    /// Destination items including the moved one, reindexed `0..N-1`.
    pub dest: Vec<ItemPosition>,
}

// =============================================================================
// SAME-CONTAINER MOVE
// =============================================================================

/// Reorder one container: remove the item at `from_index`, reinsert at
/// `to_index`, and assign order values `0..N-1` by position.
///
/// A `to_index` past the end appends. Returns `None` when `from_index` is out
/// of range or the move is a no-op (`from_index == to_index` after clamping);
/// callers must then skip the persistence call and the broadcast entirely.
#[must_use]
pub fn move_within(items: &[OrderedItem], from_index: usize, to_index: usize) -> Option<Vec<ItemPosition>> {
    if from_index >= items.len() {
        return None;
    }

    let mut sequence = sorted_ids(items);
    let moved = sequence.remove(from_index);
    let insert_at = to_index.min(sequence.len());
    if insert_at == from_index {
        return None;
    }
    sequence.insert(insert_at, moved);

    Some(dense(&sequence))
}

// =============================================================================
// CROSS-CONTAINER MOVE
// =============================================================================

/// Move the item at `from_index` of the source container into the destination
/// container at `to_index`, then densely reindex both containers
/// independently. The source is reindexed even though only one item left it:
/// the removal shifts every position after it.
///
/// Returns `None` when `from_index` is out of range of the source.
#[must_use]
pub fn move_across(
    source_items: &[OrderedItem],
    dest_items: &[OrderedItem],
    from_index: usize,
    to_index: usize,
) -> Option<CrossMove> {
    if from_index >= source_items.len() {
        return None;
    }

    let mut source = sorted_ids(source_items);
    let moved = source.remove(from_index);

    let mut dest = sorted_ids(dest_items);
    let insert_at = to_index.min(dest.len());
    dest.insert(insert_at, moved);

    Some(CrossMove { source: dense(&source), dest: dense(&dest) })
}

// =============================================================================
// HELPERS
// =============================================================================

/// Item ids in ascending stored order.
fn sorted_ids(items: &[OrderedItem]) -> Vec<Uuid> {
    let mut sorted: Vec<&OrderedItem> = items.iter().collect();
    sorted.sort_by_key(|item| item.order);
    sorted.iter().map(|item| item.id).collect()
}

/// Assign `0..N-1` by position.
fn dense(sequence: &[Uuid]) -> Vec<ItemPosition> {
    sequence
        .iter()
        .enumerate()
        .map(|(index, id)| ItemPosition { id: *id, order: index as i64 })
        .collect()
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
