//! Client synchronization shim for the realtime board protocol.
//!
//! ARCHITECTURE
//! ============
//! Embedding UIs drive three pieces:
//!
//! - [`view::BoardView`] — the per-board-view state machine: mount/join,
//!   presence projection, connectivity banner, and cache invalidation on
//!   incoming mutation events.
//! - [`sync::SyncEngine`] — optimistic drag handling: local dense reindex on
//!   gesture, per-container serialization of reorder submissions, and revert
//!   to the last known-good snapshot on failure.
//! - [`net`] — the reconnecting WebSocket loop pumping server messages into
//!   the two above and commands out to the server.
//!
//! [`api::ApiClient`] refetches invalidated collections over REST; incoming
//! event payloads are never merged into local state.

pub mod api;
pub mod net;
pub mod sync;
pub mod view;
