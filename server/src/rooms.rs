//! Room registry — connection identities, board-scoped presence, broadcast.
//!
//! DESIGN
//! ======
//! One owner object holds the only two pieces of process-wide mutable state:
//! the connection registry and the room membership map. Handler code never
//! touches either directly; all mutation flows through `register` /
//! `unregister` / `join` / `leave`, and fan-out through `emit`. Both maps sit
//! behind a single `tokio::sync::RwLock` because joins, leaves and emits race
//! from independent connection tasks.
//!
//! A room exists from the moment its first member joins and is discarded the
//! instant its connection set empties — no dangling empty rooms. Presence is
//! keyed by user, so a user viewing a board from two tabs collapses to one
//! entry; the entry is dropped only when that user's last connection leaves.
//!
//! LIFECYCLE
//! =========
//! 1. Handshake admits the connection → `register`
//! 2. `join` switches the connection's room (leaving any previous one)
//! 3. `emit` fans events out to every member connection, minus the sender
//! 4. Socket close → `unregister` removes presence before any later broadcast

use std::collections::HashMap;
use std::sync::Arc;

use protocol::{EventPayload, PresenceEntry, ServerMessage, epoch_ms};
use tokio::sync::{RwLock, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::gate::Identity;

/// Capacity of each connection's outbound message channel.
pub const OUTBOUND_CAPACITY: usize = 256;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("connection {0} is not registered")]
    UnknownConnection(Uuid),
}

/// Registered connection: identity plus the room it currently views.
struct Connection {
    user_id: Uuid,
    user_email: String,
    avatar_url: Option<String>,
    current_room: Option<Uuid>,
    tx: mpsc::Sender<ServerMessage>,
}

/// Live state of one board room.
#[derive(Default)]
struct Room {
    /// Member connections and their outbound senders.
    connections: HashMap<Uuid, mpsc::Sender<ServerMessage>>,
    /// One presence entry per distinct user.
    members: HashMap<Uuid, PresenceEntry>,
}

#[derive(Default)]
struct RoomsInner {
    connections: HashMap<Uuid, Connection>,
    rooms: HashMap<Uuid, Room>,
}

/// Shared handle to the registry. Clone is cheap; all clones see one state.
#[derive(Clone, Default)]
pub struct Rooms {
    inner: Arc<RwLock<RoomsInner>>,
}

// =============================================================================
// CONNECTION REGISTRY
// =============================================================================

impl Rooms {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit an authenticated connection into the registry.
    pub async fn register(&self, connection_id: Uuid, identity: &Identity, tx: mpsc::Sender<ServerMessage>) {
        let mut inner = self.inner.write().await;
        inner.connections.insert(
            connection_id,
            Connection {
                user_id: identity.user_id,
                user_email: identity.user_email.clone(),
                avatar_url: identity.avatar_url.clone(),
                current_room: None,
                tx,
            },
        );
        info!(%connection_id, user_id = %identity.user_id, "connection registered");
    }

    /// Remove a dropped connection, vacating its room first so no orphaned
    /// presence entry survives. Returns the vacated room and user so the
    /// caller can broadcast the recomputed presence afterwards.
    pub async fn unregister(&self, connection_id: Uuid) -> Option<(Uuid, Uuid)> {
        let mut inner = self.inner.write().await;
        let conn = inner.connections.remove(&connection_id)?;
        info!(%connection_id, user_id = %conn.user_id, "connection unregistered");

        let board_id = conn.current_room?;
        remove_from_room(&mut inner, connection_id, conn.user_id, board_id);
        Some((board_id, conn.user_id))
    }

    /// Room the connection currently views, if any.
    pub async fn current_room(&self, connection_id: Uuid) -> Option<Uuid> {
        let inner = self.inner.read().await;
        inner.connections.get(&connection_id)?.current_room
    }
}

// =============================================================================
// JOIN / LEAVE
// =============================================================================

impl Rooms {
    /// Join a board room, leaving any previously joined room. Idempotent: a
    /// connection re-joining its current room only refreshes `joined_at`.
    /// Returns the full presence snapshot for the room, newest joins last.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::UnknownConnection`] when the connection was never
    /// registered (or already unregistered).
    pub async fn join(&self, connection_id: Uuid, board_id: Uuid) -> Result<Vec<PresenceEntry>, RoomError> {
        let mut inner = self.inner.write().await;

        let (user_id, user_email, avatar_url, previous) = {
            let conn = inner
                .connections
                .get(&connection_id)
                .ok_or(RoomError::UnknownConnection(connection_id))?;
            (conn.user_id, conn.user_email.clone(), conn.avatar_url.clone(), conn.current_room)
        };

        if let Some(old_board) = previous
            && old_board != board_id
        {
            remove_from_room(&mut inner, connection_id, user_id, old_board);
        }

        let tx = match inner.connections.get_mut(&connection_id) {
            Some(conn) => {
                conn.current_room = Some(board_id);
                conn.tx.clone()
            }
            None => return Err(RoomError::UnknownConnection(connection_id)),
        };

        let room = inner.rooms.entry(board_id).or_default();
        room.connections.insert(connection_id, tx);
        // A second connection of the same user overwrites the earlier entry,
        // refreshing `joined_at`.
        room.members.insert(
            user_id,
            PresenceEntry { user_id, user_email, avatar_url, joined_at: epoch_ms() },
        );

        info!(%board_id, %connection_id, members = room.members.len(), "joined room");
        Ok(snapshot(room))
    }

    /// Leave a board room. Idempotent: leaving a room the connection never
    /// joined is a no-op.
    pub async fn leave(&self, connection_id: Uuid, board_id: Uuid) {
        let mut inner = self.inner.write().await;

        let Some(conn) = inner.connections.get_mut(&connection_id) else {
            return;
        };
        let user_id = conn.user_id;
        if conn.current_room == Some(board_id) {
            conn.current_room = None;
        }

        remove_from_room(&mut inner, connection_id, user_id, board_id);
        info!(%board_id, %connection_id, "left room");
    }
}

// =============================================================================
// BROADCAST / PRESENCE
// =============================================================================

impl Rooms {
    /// Fire-and-forget delivery to every member connection of the room,
    /// except `exclude` (the originator, which already applied the change
    /// optimistically). No acknowledgment is awaited; a recipient whose
    /// channel is full or closed simply misses the event and recovers on its
    /// next refetch.
    pub async fn emit(&self, board_id: Uuid, message: &ServerMessage, exclude: Option<Uuid>) {
        let inner = self.inner.read().await;
        let Some(room) = inner.rooms.get(&board_id) else {
            return;
        };

        for (connection_id, tx) in &room.connections {
            if exclude == Some(*connection_id) {
                continue;
            }
            if let Err(e) = tx.try_send(message.clone()) {
                warn!(%board_id, %connection_id, error = %e, "broadcast delivery skipped");
            }
        }
    }

    /// Current presence for a room. Unknown rooms read as empty, not errors.
    pub async fn get_presence(&self, board_id: Uuid) -> Vec<PresenceEntry> {
        let inner = self.inner.read().await;
        inner.rooms.get(&board_id).map(snapshot).unwrap_or_default()
    }

    /// Complete recomputed member list as a broadcast payload — never a delta.
    pub async fn presence_payload(&self, board_id: Uuid) -> EventPayload {
        let members = self.get_presence(board_id).await;
        let count = members.len();
        EventPayload::BoardPresence { members, count }
    }
}

#[cfg(test)]
impl Rooms {
    pub(crate) async fn contains_room(&self, board_id: Uuid) -> bool {
        self.inner.read().await.rooms.contains_key(&board_id)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Detach a connection from a room, dropping the user's presence entry when
/// this was their last connection there, and the room when it empties.
fn remove_from_room(inner: &mut RoomsInner, connection_id: Uuid, user_id: Uuid, board_id: Uuid) {
    let Some(room) = inner.rooms.get_mut(&board_id) else {
        return;
    };
    room.connections.remove(&connection_id);

    let user_still_present = room
        .connections
        .keys()
        .any(|cid| inner.connections.get(cid).is_some_and(|c| c.user_id == user_id));
    if !user_still_present {
        room.members.remove(&user_id);
    }

    if room.connections.is_empty() {
        inner.rooms.remove(&board_id);
        info!(%board_id, "room evicted");
    }
}

fn snapshot(room: &Room) -> Vec<PresenceEntry> {
    let mut members: Vec<PresenceEntry> = room.members.values().cloned().collect();
    members.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.user_id.cmp(&b.user_id)));
    members
}

#[cfg(test)]
#[path = "rooms_test.rs"]
mod tests;
