//! Ordering service — drag gestures to committed order values.
//!
//! DESIGN
//! ======
//! Loads the authoritative container snapshot, resolves the moved item's real
//! index by id (a stale index hint from the client can shift the wrong item;
//! an id cannot), runs the pure reconciler, and applies the result through the
//! persistence adapter: one `reorder` call for a same-container move, and two
//! for a cross-container move (source first, then destination).
//!
//! Two clients dragging in the same container concurrently may each reindex
//! from a stale snapshot; the adapter's transaction makes that
//! last-committed-wins, and the losing client refetches on its next
//! interaction. That is the intended consistency model — do not add locking
//! here, it would serialize concurrent drags.
//!
//! ERROR HANDLING
//! ==============
//! Transient store failures are retried exactly once before surfacing. A
//! returned error means nothing was broadcast: events only ever follow a
//! successful commit.

use protocol::EventPayload;
use tracing::{info, warn};
use uuid::Uuid;

use crate::services::persistence::{BoardStore, PersistError, ReorderScope};

// =============================================================================
// MOVE REQUESTS
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct ListMove {
    pub board_id: Uuid,
    pub list_id: Uuid,
    pub to_index: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct CardMove {
    pub card_id: Uuid,
    pub from_list: Uuid,
    pub to_list: Uuid,
    pub to_index: usize,
}

// =============================================================================
// LIST MOVES
// =============================================================================

/// Reorder a board's lists. Returns the broadcast payload, or `None` for a
/// no-op gesture (nothing persisted, nothing to broadcast).
///
/// # Errors
///
/// [`PersistError::Missing`] when the list vanished; transient or permanent
/// storage errors after the retry policy is exhausted.
pub async fn move_list(store: &dyn BoardStore, mv: ListMove) -> Result<Option<EventPayload>, PersistError> {
    let items = store.lists_in_board(mv.board_id).await?;
    let from_index = items
        .iter()
        .position(|item| item.id == mv.list_id)
        .ok_or(PersistError::Missing(mv.list_id))?;

    let Some(positions) = reorder::move_within(&items, from_index, mv.to_index) else {
        return Ok(None);
    };

    reorder_with_retry(store, ReorderScope::Lists { board_id: mv.board_id }, &positions).await?;
    info!(board_id = %mv.board_id, list_id = %mv.list_id, count = positions.len(), "lists reindexed");

    Ok(Some(EventPayload::ListMoved { board_id: mv.board_id, positions }))
}

// =============================================================================
// CARD MOVES
// =============================================================================

/// Reorder cards, within one list or across two. Returns the broadcast
/// payload, or `None` for a no-op gesture.
///
/// # Errors
///
/// [`PersistError::Missing`] when the card vanished; transient or permanent
/// storage errors after the retry policy is exhausted.
pub async fn move_card(store: &dyn BoardStore, mv: CardMove) -> Result<Option<EventPayload>, PersistError> {
    if mv.from_list == mv.to_list {
        move_card_within(store, mv).await
    } else {
        move_card_across(store, mv).await
    }
}

async fn move_card_within(store: &dyn BoardStore, mv: CardMove) -> Result<Option<EventPayload>, PersistError> {
    let items = store.cards_in_list(mv.from_list).await?;
    let from_index = items
        .iter()
        .position(|item| item.id == mv.card_id)
        .ok_or(PersistError::Missing(mv.card_id))?;

    let Some(positions) = reorder::move_within(&items, from_index, mv.to_index) else {
        return Ok(None);
    };

    reorder_with_retry(store, ReorderScope::Cards { list_id: mv.from_list }, &positions).await?;
    info!(list_id = %mv.from_list, card_id = %mv.card_id, count = positions.len(), "cards reindexed");

    Ok(Some(EventPayload::CardMoved {
        card_id: mv.card_id,
        from_list: mv.from_list,
        to_list: mv.to_list,
        source_positions: Vec::new(),
        dest_positions: positions,
    }))
}

async fn move_card_across(store: &dyn BoardStore, mv: CardMove) -> Result<Option<EventPayload>, PersistError> {
    let source_items = store.cards_in_list(mv.from_list).await?;
    let dest_items = store.cards_in_list(mv.to_list).await?;
    let from_index = source_items
        .iter()
        .position(|item| item.id == mv.card_id)
        .ok_or(PersistError::Missing(mv.card_id))?;

    let Some(cross) = reorder::move_across(&source_items, &dest_items, from_index, mv.to_index) else {
        return Ok(None);
    };

    // Source container commits before the destination.
    reorder_with_retry(store, ReorderScope::Cards { list_id: mv.from_list }, &cross.source).await?;
    reorder_with_retry(store, ReorderScope::Cards { list_id: mv.to_list }, &cross.dest).await?;
    info!(
        from_list = %mv.from_list,
        to_list = %mv.to_list,
        card_id = %mv.card_id,
        "card moved across lists"
    );

    Ok(Some(EventPayload::CardMoved {
        card_id: mv.card_id,
        from_list: mv.from_list,
        to_list: mv.to_list,
        source_positions: cross.source,
        dest_positions: cross.dest,
    }))
}

// =============================================================================
// RETRY
// =============================================================================

/// Apply one container's reorder, retrying exactly once on a transient error.
async fn reorder_with_retry(
    store: &dyn BoardStore,
    scope: ReorderScope,
    items: &[reorder::ItemPosition],
) -> Result<(), PersistError> {
    match store.reorder(scope, items).await {
        Err(e) if e.is_transient() => {
            warn!(error = %e, "reorder hit transient failure; retrying once");
            store.reorder(scope, items).await
        }
        other => other,
    }
}

#[cfg(test)]
#[path = "ordering_test.rs"]
mod tests;
