//! Optimistic reorder engine.
//!
//! DESIGN
//! ======
//! A drag gesture applies its dense reindex to the local model immediately,
//! through the same pure reconciler the server runs, and the move request
//! ships to the server carrying the gesture. At most one reorder per
//! container is in flight at a time: later gestures on a busy container
//! queue behind the outstanding one, so the server never sees two reindexes
//! of one container whose relative order is ambiguous. Gestures on disjoint
//! containers proceed concurrently.
//!
//! Acknowledgments arrive in send order on the connection, so the oldest
//! in-flight move resolves first. A failed move restores the pre-gesture
//! snapshot of every container it touched and drops queued gestures that
//! were stacked on top of the reverted state; the UI then refetches.

use std::collections::{HashMap, HashSet, VecDeque};

use protocol::ClientRequest;
use reorder::{ItemPosition, OrderedItem};
use uuid::Uuid;

// =============================================================================
// MODEL
// =============================================================================

/// Local orderable state of the mounted board, always densely ordered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardModel {
    /// List sequence, ascending by order.
    pub lists: Vec<OrderedItem>,
    /// Card sequence per list, ascending by order.
    pub cards: HashMap<Uuid, Vec<OrderedItem>>,
}

/// Result of resolving one move acknowledgment.
#[derive(Debug, Default)]
pub struct AckOutcome {
    /// Queued requests whose containers freed up; send them now, in order.
    pub send_next: Vec<ClientRequest>,
    /// The optimistic state was rolled back; surface an error and refetch.
    pub reverted: bool,
}

enum Restore {
    Lists(Vec<OrderedItem>),
    Cards { list_id: Uuid, items: Vec<OrderedItem> },
}

struct PendingMove {
    request: ClientRequest,
    /// Containers the move touches: the board id for list moves, the
    /// affected list ids for card moves.
    containers: Vec<Uuid>,
    /// Pre-gesture state of each touched container.
    restores: Vec<Restore>,
}

// =============================================================================
// SYNC ENGINE
// =============================================================================

pub struct SyncEngine {
    board_id: Uuid,
    model: BoardModel,
    /// Sent moves awaiting acknowledgment, oldest first.
    inflight: VecDeque<PendingMove>,
    /// Gestures waiting for their containers to free up.
    queued: VecDeque<PendingMove>,
}

impl SyncEngine {
    #[must_use]
    pub fn new(board_id: Uuid) -> Self {
        Self {
            board_id,
            model: BoardModel::default(),
            inflight: VecDeque::new(),
            queued: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn model(&self) -> &BoardModel {
        &self.model
    }

    /// Replace the list sequence from a refetch. Skipped (returns `false`)
    /// while a list move is outstanding — the optimistic state wins until it
    /// resolves.
    pub fn hydrate_lists(&mut self, items: Vec<OrderedItem>) -> bool {
        if self.busy_containers().contains(&self.board_id) {
            return false;
        }
        self.model.lists = items;
        true
    }

    /// Replace one list's card sequence from a refetch. Skipped (returns
    /// `false`) while a move touching that list is outstanding.
    pub fn hydrate_cards(&mut self, list_id: Uuid, items: Vec<OrderedItem>) -> bool {
        if self.busy_containers().contains(&list_id) {
            return false;
        }
        self.model.cards.insert(list_id, items);
        true
    }
}

// =============================================================================
// GESTURES
// =============================================================================

impl SyncEngine {
    /// Drag a list to a new index. Applies the reindex locally and returns
    /// the request to send now — `None` when the gesture is a no-op (nothing
    /// sent at all) or when it queued behind an outstanding move.
    pub fn drag_list(&mut self, list_id: Uuid, to_index: usize) -> Option<ClientRequest> {
        let from_index = self.model.lists.iter().position(|item| item.id == list_id)?;
        let positions = reorder::move_within(&self.model.lists, from_index, to_index)?;

        let restore = Restore::Lists(std::mem::replace(&mut self.model.lists, as_items(&positions)));
        let pending = PendingMove {
            request: ClientRequest::MoveList { board_id: self.board_id, list_id, to_index },
            containers: vec![self.board_id],
            restores: vec![restore],
        };
        self.submit(pending)
    }

    /// Drag a card within or across lists. Same contract as
    /// [`Self::drag_list`]: optimistic apply, then send or queue.
    pub fn drag_card(
        &mut self,
        card_id: Uuid,
        from_list: Uuid,
        to_list: Uuid,
        to_index: usize,
    ) -> Option<ClientRequest> {
        let request = ClientRequest::MoveCard { card_id, from_list, to_list, to_index };

        let pending = if from_list == to_list {
            let items = self.model.cards.get(&from_list)?;
            let from_index = items.iter().position(|item| item.id == card_id)?;
            let positions = reorder::move_within(items, from_index, to_index)?;

            let old = self.model.cards.insert(from_list, as_items(&positions)).unwrap_or_default();
            PendingMove {
                request,
                containers: vec![from_list],
                restores: vec![Restore::Cards { list_id: from_list, items: old }],
            }
        } else {
            let source = self.model.cards.get(&from_list)?;
            let from_index = source.iter().position(|item| item.id == card_id)?;
            let dest = self.model.cards.get(&to_list).cloned().unwrap_or_default();
            let cross = reorder::move_across(source, &dest, from_index, to_index)?;

            let old_source = self.model.cards.insert(from_list, as_items(&cross.source)).unwrap_or_default();
            let old_dest = self.model.cards.insert(to_list, as_items(&cross.dest)).unwrap_or_default();
            PendingMove {
                request,
                containers: vec![from_list, to_list],
                restores: vec![
                    Restore::Cards { list_id: from_list, items: old_source },
                    Restore::Cards { list_id: to_list, items: old_dest },
                ],
            }
        };

        self.submit(pending)
    }

    /// Send now if every touched container is free, queue otherwise.
    fn submit(&mut self, pending: PendingMove) -> Option<ClientRequest> {
        let busy = self.busy_containers();
        if pending.containers.iter().any(|c| busy.contains(c)) {
            self.queued.push_back(pending);
            return None;
        }
        let request = pending.request.clone();
        self.inflight.push_back(pending);
        Some(request)
    }
}

// =============================================================================
// ACKNOWLEDGMENTS
// =============================================================================

impl SyncEngine {
    /// Resolve the oldest in-flight move. On failure the touched containers
    /// roll back to their pre-gesture snapshots and queued gestures stacked
    /// on them are dropped. Either way, newly unblocked queued moves are
    /// promoted and returned for sending.
    pub fn ack(&mut self, success: bool) -> AckOutcome {
        let Some(done) = self.inflight.pop_front() else {
            return AckOutcome::default();
        };

        let mut reverted = false;
        if !success {
            for restore in done.restores {
                match restore {
                    Restore::Lists(items) => self.model.lists = items,
                    Restore::Cards { list_id, items } => {
                        self.model.cards.insert(list_id, items);
                    }
                }
            }
            let affected: HashSet<Uuid> = done.containers.iter().copied().collect();
            self.queued.retain(|p| p.containers.iter().all(|c| !affected.contains(c)));
            reverted = true;
        }

        let mut busy: HashSet<Uuid> = self
            .inflight
            .iter()
            .flat_map(|p| p.containers.iter().copied())
            .collect();
        let mut send_next = Vec::new();
        let mut still_queued = VecDeque::new();

        while let Some(pending) = self.queued.pop_front() {
            let blocked = pending.containers.iter().any(|c| busy.contains(c));
            busy.extend(pending.containers.iter().copied());
            if blocked {
                // Keep waiting; later gestures on the same container must not
                // overtake this one.
                still_queued.push_back(pending);
            } else {
                send_next.push(pending.request.clone());
                self.inflight.push_back(pending);
            }
        }
        self.queued = still_queued;

        AckOutcome { send_next, reverted }
    }

    fn busy_containers(&self) -> HashSet<Uuid> {
        self.inflight
            .iter()
            .chain(self.queued.iter())
            .flat_map(|p| p.containers.iter().copied())
            .collect()
    }
}

fn as_items(positions: &[ItemPosition]) -> Vec<OrderedItem> {
    positions.iter().map(|p| OrderedItem::new(p.id, p.order)).collect()
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;
