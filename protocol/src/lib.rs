//! Shared wire model for the realtime board synchronization protocol.
//!
//! ARCHITECTURE
//! ============
//! This crate owns every message that crosses the WebSocket: client requests,
//! server acknowledgments, and the broadcast event envelope fanned out to a
//! board room. Both `server` and `client` depend on it, so the two sides can
//! never disagree on shape.
//!
//! DESIGN
//! ======
//! - Requests and server messages are internally tagged on `op`; broadcast
//!   payloads are tagged on `event` with the payload under `data`. Everything
//!   on the wire is a typed discriminated union, never a loose map.
//! - The [`Event`] envelope is immutable: constructed once per mutation and
//!   delivered verbatim to every recipient, with no per-recipient fields.
//! - Rejection codes are a closed enum so clients can match on them instead
//!   of parsing message strings.

use std::time::{SystemTime, UNIX_EPOCH};

use reorder::ItemPosition;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// TIME
// =============================================================================

/// Current time as milliseconds since the Unix epoch.
#[must_use]
pub fn epoch_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

// =============================================================================
// PRESENCE
// =============================================================================

/// One user currently viewing a board. A user with several connections in the
/// same room collapses to a single entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub user_id: Uuid,
    pub user_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Epoch milliseconds of the most recent join.
    pub joined_at: i64,
}

// =============================================================================
// ENTITY SUMMARIES
// =============================================================================

/// Board fields carried on board mutation events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSummary {
    pub id: Uuid,
    pub name: String,
}

/// List fields carried on list mutation events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSummary {
    pub id: Uuid,
    pub board_id: Uuid,
    pub title: String,
    pub position: i64,
}

/// Card fields carried on card mutation events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSummary {
    pub id: Uuid,
    pub list_id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub position: i64,
}

// =============================================================================
// BROADCAST EVENTS
// =============================================================================

/// Envelope for every room broadcast: who did what on which board, when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub board_id: Uuid,
    /// The acting user. Informational; recipients must not authorize on it.
    pub user_id: Uuid,
    /// Epoch milliseconds at construction.
    pub ts: i64,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    /// Stamp a payload into a broadcast envelope.
    #[must_use]
    pub fn new(board_id: Uuid, user_id: Uuid, payload: EventPayload) -> Self {
        Self { board_id, user_id, ts: epoch_ms(), payload }
    }
}

/// Entity category an event concerns, for cache-invalidation routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Board,
    List,
    Card,
    Presence,
}

/// The typed payload of a room broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum EventPayload {
    #[serde(rename = "board:updated")]
    BoardUpdated { board: BoardSummary },
    #[serde(rename = "board:deleted")]
    BoardDeleted { board_id: Uuid },
    /// Complete recomputed member list — never a delta.
    #[serde(rename = "board:presence")]
    BoardPresence { members: Vec<PresenceEntry>, count: usize },
    #[serde(rename = "list:created")]
    ListCreated { list: ListSummary },
    #[serde(rename = "list:updated")]
    ListUpdated { list: ListSummary },
    /// Dense reindex of every list on the board after a list drag.
    #[serde(rename = "list:moved")]
    ListMoved { board_id: Uuid, positions: Vec<ItemPosition> },
    #[serde(rename = "list:deleted")]
    ListDeleted { list_id: Uuid },
    #[serde(rename = "card:created")]
    CardCreated { card: CardSummary },
    #[serde(rename = "card:updated")]
    CardUpdated { card: CardSummary },
    /// Dense reindex of both containers touched by a card drag.
    /// `source_positions` is empty for a same-list move.
    #[serde(rename = "card:moved")]
    CardMoved {
        card_id: Uuid,
        from_list: Uuid,
        to_list: Uuid,
        source_positions: Vec<ItemPosition>,
        dest_positions: Vec<ItemPosition>,
    },
    #[serde(rename = "card:deleted")]
    CardDeleted { card_id: Uuid, list_id: Uuid },
}

impl EventPayload {
    /// Wire tag for this payload.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BoardUpdated { .. } => "board:updated",
            Self::BoardDeleted { .. } => "board:deleted",
            Self::BoardPresence { .. } => "board:presence",
            Self::ListCreated { .. } => "list:created",
            Self::ListUpdated { .. } => "list:updated",
            Self::ListMoved { .. } => "list:moved",
            Self::ListDeleted { .. } => "list:deleted",
            Self::CardCreated { .. } => "card:created",
            Self::CardUpdated { .. } => "card:updated",
            Self::CardMoved { .. } => "card:moved",
            Self::CardDeleted { .. } => "card:deleted",
        }
    }

    /// Which entity category the event concerns.
    #[must_use]
    pub fn category(&self) -> EventCategory {
        match self {
            Self::BoardUpdated { .. } | Self::BoardDeleted { .. } => EventCategory::Board,
            Self::BoardPresence { .. } => EventCategory::Presence,
            Self::ListCreated { .. }
            | Self::ListUpdated { .. }
            | Self::ListMoved { .. }
            | Self::ListDeleted { .. } => EventCategory::List,
            Self::CardCreated { .. }
            | Self::CardUpdated { .. }
            | Self::CardMoved { .. }
            | Self::CardDeleted { .. } => EventCategory::Card,
        }
    }

    /// Payload kinds only the server may construct. Clients relaying CRUD
    /// notifications via `announce` cannot forge these.
    #[must_use]
    pub fn server_owned(&self) -> bool {
        matches!(
            self,
            Self::BoardPresence { .. } | Self::ListMoved { .. } | Self::CardMoved { .. }
        )
    }
}

// =============================================================================
// CLIENT REQUESTS
// =============================================================================

/// Messages a client may send after the connection is admitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum ClientRequest {
    #[serde(rename = "board:join")]
    Join { board_id: Uuid },
    #[serde(rename = "board:leave")]
    Leave { board_id: Uuid },
    /// Direct "who's here" query; answered with a `board:presence` event.
    #[serde(rename = "board:presence")]
    Presence { board_id: Uuid },
    #[serde(rename = "list:move")]
    MoveList { board_id: Uuid, list_id: Uuid, to_index: usize },
    #[serde(rename = "card:move")]
    MoveCard {
        card_id: Uuid,
        from_list: Uuid,
        to_list: Uuid,
        to_index: usize,
    },
    /// Relay a CRUD mutation notification to room peers (sender excluded).
    #[serde(rename = "announce")]
    Announce { payload: EventPayload },
}

// =============================================================================
// SERVER MESSAGES
// =============================================================================

/// Acknowledgment of `board:join`. `presence` carries the full current
/// snapshot so the caller can render existing viewers immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinAck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<Vec<PresenceEntry>>,
}

/// Acknowledgment of `board:leave`, `list:move`, or `card:move`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Ack {
    #[must_use]
    pub fn ok() -> Self {
        Self { success: true, message: None }
    }

    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: Some(message.into()) }
    }
}

/// Messages the server sends over a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum ServerMessage {
    /// First message after a successful handshake.
    #[serde(rename = "session:welcome")]
    Welcome { connection_id: Uuid, user_id: Uuid },
    #[serde(rename = "board:join")]
    JoinAck(JoinAck),
    #[serde(rename = "board:leave")]
    LeaveAck(Ack),
    #[serde(rename = "list:move")]
    ListMoveAck(Ack),
    #[serde(rename = "card:move")]
    CardMoveAck(Ack),
    #[serde(rename = "event")]
    Broadcast(Event),
    /// Typed rejection of the triggering request; the connection stays open.
    #[serde(rename = "error")]
    Rejected { code: RejectCode, message: String },
}

// =============================================================================
// REJECTION CODES
// =============================================================================

/// Closed taxonomy of wire-visible failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectCode {
    AuthRequired,
    InvalidToken,
    RateLimitExceeded,
    JoinFailed,
    LeaveFailed,
    PersistTransient,
    PersistPermanent,
    /// Frame did not parse as a known request.
    InvalidRequest,
}

impl RejectCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::JoinFailed => "JOIN_FAILED",
            Self::LeaveFailed => "LEAVE_FAILED",
            Self::PersistTransient => "PERSIST_TRANSIENT",
            Self::PersistPermanent => "PERSIST_PERMANENT",
            Self::InvalidRequest => "INVALID_REQUEST",
        }
    }
}

impl std::fmt::Display for RejectCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
