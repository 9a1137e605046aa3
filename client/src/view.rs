//! Board-view session state machine.
//!
//! DESIGN
//! ======
//! One `BoardView` per mounted board view. Mounting issues the join and holds
//! the view in `Joining` until the acknowledgment lands (or times out);
//! unmounting issues the leave. A dropped transport moves the view to
//! `Disconnected` — presence is suppressed and nothing re-joins until the net
//! layer reports a fresh connection.
//!
//! Incoming mutation events never merge into local state: they invalidate the
//! matching cached collection, and the next read refetches the authoritative
//! sequence over REST. Presence events are the one exception — each carries
//! the complete member list, so the projection is replaced wholesale.

use protocol::{ClientRequest, Event, EventCategory, EventPayload, JoinAck, PresenceEntry};
use uuid::Uuid;

// =============================================================================
// TYPES
// =============================================================================

/// Lifecycle of one mounted board view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewPhase {
    #[default]
    Unmounted,
    /// Join sent; acknowledgment outstanding.
    Joining,
    Joined,
    /// Transport dropped while mounted; waiting for a fresh connection.
    Disconnected,
    /// Join failed or timed out; an explicit retry is required.
    Errored,
}

/// Connectivity banner shown over the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Banner {
    Hidden,
    /// Transient: a join round-trip is in flight.
    Connecting,
    /// The connection dropped; a refresh will reconnect.
    Disconnected,
    /// The join failed; the user can retry.
    Error,
}

/// A cached collection whose contents went stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refetch {
    /// The board's list sequence.
    Lists,
    /// One list's card sequence.
    Cards(Uuid),
}

// =============================================================================
// BOARD VIEW
// =============================================================================

pub struct BoardView {
    board_id: Uuid,
    phase: ViewPhase,
    presence: Vec<PresenceEntry>,
    refetches: Vec<Refetch>,
    board_deleted: bool,
}

impl BoardView {
    #[must_use]
    pub fn new(board_id: Uuid) -> Self {
        Self {
            board_id,
            phase: ViewPhase::Unmounted,
            presence: Vec::new(),
            refetches: Vec::new(),
            board_deleted: false,
        }
    }

    #[must_use]
    pub fn board_id(&self) -> Uuid {
        self.board_id
    }

    #[must_use]
    pub fn phase(&self) -> ViewPhase {
        self.phase
    }

    /// Presence entries to render. Empty unless joined.
    #[must_use]
    pub fn presence(&self) -> &[PresenceEntry] {
        &self.presence
    }

    #[must_use]
    pub fn board_deleted(&self) -> bool {
        self.board_deleted
    }

    #[must_use]
    pub fn banner(&self) -> Banner {
        match self.phase {
            ViewPhase::Unmounted | ViewPhase::Joined => Banner::Hidden,
            ViewPhase::Joining => Banner::Connecting,
            ViewPhase::Disconnected => Banner::Disconnected,
            ViewPhase::Errored => Banner::Error,
        }
    }
}

// =============================================================================
// LIFECYCLE TRANSITIONS
// =============================================================================

impl BoardView {
    /// Mount the view (or retry after an error). Returns the join request to
    /// send, or `None` when a join is already in flight or acknowledged.
    pub fn mount(&mut self) -> Option<ClientRequest> {
        match self.phase {
            ViewPhase::Unmounted | ViewPhase::Errored => {
                self.phase = ViewPhase::Joining;
                Some(ClientRequest::Join { board_id: self.board_id })
            }
            ViewPhase::Joining | ViewPhase::Joined | ViewPhase::Disconnected => None,
        }
    }

    /// Unmount the view. Returns the leave request to send when the server
    /// still believes we are (or may be) in the room.
    pub fn unmount(&mut self) -> Option<ClientRequest> {
        let leave = match self.phase {
            ViewPhase::Joining | ViewPhase::Joined => {
                Some(ClientRequest::Leave { board_id: self.board_id })
            }
            ViewPhase::Unmounted | ViewPhase::Disconnected | ViewPhase::Errored => None,
        };
        self.phase = ViewPhase::Unmounted;
        self.presence.clear();
        self.refetches.clear();
        leave
    }

    /// Apply the join acknowledgment: seed presence from the snapshot on
    /// success, park in the error state on failure.
    pub fn handle_join_ack(&mut self, ack: &JoinAck) {
        if self.phase != ViewPhase::Joining {
            return;
        }
        if ack.success {
            self.phase = ViewPhase::Joined;
            self.presence = ack.presence.clone().unwrap_or_default();
        } else {
            self.phase = ViewPhase::Errored;
            self.presence.clear();
        }
    }

    /// The join acknowledgment never arrived. The view must not hang in
    /// `Joining` forever.
    pub fn join_timed_out(&mut self) {
        if self.phase == ViewPhase::Joining {
            self.phase = ViewPhase::Errored;
            self.presence.clear();
        }
    }

    /// The underlying connection dropped. Presence is suppressed; no
    /// automatic re-join happens from here.
    pub fn connection_lost(&mut self) {
        if matches!(self.phase, ViewPhase::Joining | ViewPhase::Joined) {
            self.phase = ViewPhase::Disconnected;
            self.presence.clear();
        }
    }

    /// A fresh connection is up. Re-enters `Joining` if the view was
    /// disconnected; returns the join request to send.
    pub fn reconnected(&mut self) -> Option<ClientRequest> {
        if self.phase == ViewPhase::Disconnected {
            self.phase = ViewPhase::Joining;
            Some(ClientRequest::Join { board_id: self.board_id })
        } else {
            None
        }
    }
}

// =============================================================================
// EVENT INTAKE
// =============================================================================

impl BoardView {
    /// Route one broadcast event into the view: replace presence wholesale,
    /// or mark the touched collection stale for refetch.
    pub fn apply_event(&mut self, event: &Event) {
        if event.board_id != self.board_id || self.phase != ViewPhase::Joined {
            return;
        }

        match &event.payload {
            EventPayload::BoardPresence { members, .. } => {
                self.presence = members.clone();
            }
            EventPayload::BoardDeleted { .. } => {
                self.board_deleted = true;
                self.presence.clear();
            }
            EventPayload::CardMoved { from_list, to_list, .. } => {
                self.invalidate(Refetch::Cards(*from_list));
                if to_list != from_list {
                    self.invalidate(Refetch::Cards(*to_list));
                }
            }
            EventPayload::CardCreated { card } | EventPayload::CardUpdated { card } => {
                self.invalidate(Refetch::Cards(card.list_id));
            }
            EventPayload::CardDeleted { list_id, .. } => {
                self.invalidate(Refetch::Cards(*list_id));
            }
            payload => {
                if payload.category() == EventCategory::List {
                    self.invalidate(Refetch::Lists);
                }
                // board:updated carries only metadata; nothing cached here.
            }
        }
    }

    /// Drain the pending invalidations, deduplicated, in arrival order.
    pub fn take_refetches(&mut self) -> Vec<Refetch> {
        std::mem::take(&mut self.refetches)
    }

    fn invalidate(&mut self, refetch: Refetch) {
        if !self.refetches.contains(&refetch) {
            self.refetches.push(refetch);
        }
    }
}

#[cfg(test)]
#[path = "view_test.rs"]
mod tests;
