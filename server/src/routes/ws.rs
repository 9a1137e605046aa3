//! WebSocket handler — session gate, room operations, and event relay.
//!
//! DESIGN
//! ======
//! The upgrade refuses unauthenticated connections before any room operation
//! is possible. Admitted connections enter a `select!` loop: inbound client
//! requests are dispatched to handlers, and broadcast messages from room
//! peers are forwarded out. Handlers return the replies for the sender; the
//! dispatch layer owns all outbound concerns, so broadcast and reply paths
//! never diverge per handler.
//!
//! Every inbound event is counted against the connection's sliding rate
//! window first. A rejected event produces a typed `error` reply; the
//! connection itself stays open.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → verify credential → register → `session:welcome`
//! 2. Client request → rate check → handler → replies (+ room broadcasts)
//! 3. Close → unregister (presence removed first) → presence broadcast to
//!    the vacated room → rate counters dropped

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use protocol::{Ack, ClientRequest, Event, EventPayload, JoinAck, RejectCode, ServerMessage};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::gate::Identity;
use crate::rooms::OUTBOUND_CAPACITY;
use crate::services::ordering::{self, CardMove, ListMove};
use crate::state::AppState;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(credential) = params.get("credential") else {
        return (StatusCode::UNAUTHORIZED, RejectCode::AuthRequired.as_str()).into_response();
    };

    let identity = match state.verifier.verify(credential) {
        Ok(identity) => identity,
        Err(e) => {
            warn!(error = %e, "ws: credential rejected");
            return (StatusCode::UNAUTHORIZED, e.code().as_str()).into_response();
        }
    };

    ws.on_upgrade(move |socket| run_ws(socket, state, identity))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, identity: Identity) {
    let connection_id = Uuid::new_v4();

    // Per-connection channel through which room broadcasts arrive.
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(OUTBOUND_CAPACITY);
    state.rooms.register(connection_id, &identity, tx).await;

    let welcome = ServerMessage::Welcome { connection_id, user_id: identity.user_id };
    if send_message(&mut socket, &welcome).await.is_err() {
        cleanup(&state, connection_id).await;
        return;
    }
    info!(%connection_id, user_id = %identity.user_id, "ws: client connected");

    loop {
        tokio::select! {
            inbound = socket.recv() => {
                let Some(Ok(msg)) = inbound else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = process_inbound_text(&state, connection_id, &identity, text.as_str()).await;
                        let mut send_failed = false;
                        for reply in replies {
                            if send_message(&mut socket, &reply).await.is_err() {
                                send_failed = true;
                                break;
                            }
                        }
                        if send_failed {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            outbound = rx.recv() => {
                let Some(message) = outbound else { break };
                if send_message(&mut socket, &message).await.is_err() {
                    break;
                }
            }
        }
    }

    cleanup(&state, connection_id).await;
    info!(%connection_id, "ws: client disconnected");
}

/// Vacate the connection's room before anything else is broadcast to it, so
/// no recipient ever observes a presence list containing a dead connection.
async fn cleanup(state: &AppState, connection_id: Uuid) {
    if let Some((board_id, user_id)) = state.rooms.unregister(connection_id).await {
        broadcast_presence(state, board_id, user_id).await;
    }
    state.limiter.forget(connection_id);
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Parse and process one inbound text frame, returning replies for the
/// sender. Split from the socket loop so tests can drive dispatch directly.
async fn process_inbound_text(
    state: &AppState,
    connection_id: Uuid,
    identity: &Identity,
    text: &str,
) -> Vec<ServerMessage> {
    let request: ClientRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(e) => {
            warn!(%connection_id, error = %e, "ws: invalid inbound frame");
            return vec![rejected(RejectCode::InvalidRequest, format!("invalid request: {e}"))];
        }
    };

    if let Err(e) = state.limiter.check_and_record(connection_id) {
        warn!(%connection_id, error = %e, "ws: event rejected by rate limit");
        return vec![rejected(e.code(), e.to_string())];
    }

    match request {
        ClientRequest::Join { board_id } => handle_join(state, connection_id, identity, board_id).await,
        ClientRequest::Leave { board_id } => handle_leave(state, connection_id, identity, board_id).await,
        ClientRequest::Presence { board_id } => handle_presence(state, identity, board_id).await,
        ClientRequest::MoveList { board_id, list_id, to_index } => {
            handle_move_list(state, connection_id, identity, ListMove { board_id, list_id, to_index }).await
        }
        ClientRequest::MoveCard { card_id, from_list, to_list, to_index } => {
            handle_move_card(state, connection_id, identity, CardMove { card_id, from_list, to_list, to_index })
                .await
        }
        ClientRequest::Announce { payload } => {
            handle_announce(state, connection_id, identity, payload).await
        }
    }
}

// =============================================================================
// ROOM HANDLERS
// =============================================================================

async fn handle_join(
    state: &AppState,
    connection_id: Uuid,
    identity: &Identity,
    board_id: Uuid,
) -> Vec<ServerMessage> {
    match state.store.board_exists(board_id).await {
        Ok(true) => {}
        Ok(false) => return vec![join_failed(format!("board not found: {board_id}"))],
        Err(e) => {
            warn!(%board_id, error = %e, "ws: board lookup failed");
            return vec![join_failed(format!("board lookup failed: {e}"))];
        }
    }

    match state.rooms.join(connection_id, board_id).await {
        Ok(presence) => {
            broadcast_presence(state, board_id, identity.user_id).await;
            vec![ServerMessage::JoinAck(JoinAck {
                success: true,
                message: None,
                presence: Some(presence),
            })]
        }
        Err(e) => vec![join_failed(e.to_string())],
    }
}

async fn handle_leave(
    state: &AppState,
    connection_id: Uuid,
    identity: &Identity,
    board_id: Uuid,
) -> Vec<ServerMessage> {
    state.rooms.leave(connection_id, board_id).await;
    broadcast_presence(state, board_id, identity.user_id).await;
    vec![ServerMessage::LeaveAck(Ack::ok())]
}

async fn handle_presence(state: &AppState, identity: &Identity, board_id: Uuid) -> Vec<ServerMessage> {
    let payload = state.rooms.presence_payload(board_id).await;
    vec![ServerMessage::Broadcast(Event::new(board_id, identity.user_id, payload))]
}

// =============================================================================
// MOVE HANDLERS
// =============================================================================

async fn handle_move_list(
    state: &AppState,
    connection_id: Uuid,
    identity: &Identity,
    mv: ListMove,
) -> Vec<ServerMessage> {
    let Some(current) = state.rooms.current_room(connection_id).await else {
        return vec![rejected(RejectCode::InvalidRequest, "must join the board first")];
    };
    if current != mv.board_id {
        return vec![rejected(RejectCode::InvalidRequest, "may only reorder the joined board")];
    }

    match ordering::move_list(state.store.as_ref(), mv).await {
        Ok(None) => vec![ServerMessage::ListMoveAck(Ack::ok())],
        Ok(Some(payload)) => {
            let event = Event::new(mv.board_id, identity.user_id, payload);
            state.rooms.emit(mv.board_id, &ServerMessage::Broadcast(event), Some(connection_id)).await;
            vec![ServerMessage::ListMoveAck(Ack::ok())]
        }
        Err(e) => {
            warn!(board_id = %mv.board_id, error = %e, "ws: list move failed");
            vec![rejected(e.code(), e.to_string())]
        }
    }
}

async fn handle_move_card(
    state: &AppState,
    connection_id: Uuid,
    identity: &Identity,
    mv: CardMove,
) -> Vec<ServerMessage> {
    let Some(board_id) = state.rooms.current_room(connection_id).await else {
        return vec![rejected(RejectCode::InvalidRequest, "must join the board first")];
    };

    match ordering::move_card(state.store.as_ref(), mv).await {
        Ok(None) => vec![ServerMessage::CardMoveAck(Ack::ok())],
        Ok(Some(payload)) => {
            let event = Event::new(board_id, identity.user_id, payload);
            state.rooms.emit(board_id, &ServerMessage::Broadcast(event), Some(connection_id)).await;
            vec![ServerMessage::CardMoveAck(Ack::ok())]
        }
        Err(e) => {
            warn!(card_id = %mv.card_id, error = %e, "ws: card move failed");
            vec![rejected(e.code(), e.to_string())]
        }
    }
}

// =============================================================================
// ANNOUNCE HANDLER
// =============================================================================

/// Relay a CRUD notification from its originator to room peers. No reply:
/// the originator already holds the optimistic result.
async fn handle_announce(
    state: &AppState,
    connection_id: Uuid,
    identity: &Identity,
    payload: EventPayload,
) -> Vec<ServerMessage> {
    let Some(board_id) = state.rooms.current_room(connection_id).await else {
        return vec![rejected(RejectCode::InvalidRequest, "must join a board first")];
    };
    if payload.server_owned() {
        return vec![rejected(
            RejectCode::InvalidRequest,
            format!("{} events are server-owned", payload.kind()),
        )];
    }

    let event = Event::new(board_id, identity.user_id, payload);
    state.rooms.emit(board_id, &ServerMessage::Broadcast(event), Some(connection_id)).await;
    Vec::new()
}

// =============================================================================
// HELPERS
// =============================================================================

async fn broadcast_presence(state: &AppState, board_id: Uuid, actor: Uuid) {
    let payload = state.rooms.presence_payload(board_id).await;
    let event = Event::new(board_id, actor, payload);
    state.rooms.emit(board_id, &ServerMessage::Broadcast(event), None).await;
}

fn rejected(code: RejectCode, message: impl Into<String>) -> ServerMessage {
    ServerMessage::Rejected { code, message: message.into() }
}

fn join_failed(message: impl Into<String>) -> ServerMessage {
    ServerMessage::JoinAck(JoinAck { success: false, message: Some(message.into()), presence: None })
}

async fn send_message(socket: &mut WebSocket, message: &ServerMessage) -> Result<(), ()> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize message");
            return Err(());
        }
    };
    if let ServerMessage::Rejected { code, message } = message {
        warn!(%code, reason = %message, "ws: sending rejection");
    }
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
