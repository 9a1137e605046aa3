//! WebSocket client loop — connect, dispatch, reconnect.
//!
//! DESIGN
//! ======
//! One task per mounted board view. The loop connects with the credential on
//! the query string, issues the join, and then pumps three sources: server
//! messages into the view/sync state, UI commands out to the server, and a
//! join-acknowledgment deadline so the view can never hang in `Joining`.
//!
//! ERROR HANDLING
//! ==============
//! Transport failures drop the view to `Disconnected` and reconnect with
//! exponential backoff; the view re-enters `Joining` only once the fresh
//! connection is up. Server rejections cannot name the request they refuse,
//! so one received mid-flight resolves the oldest outstanding move as failed
//! — the revert-plus-refetch path restores truth either way.

use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use protocol::{ClientRequest, EventPayload, PresenceEntry, RejectCode, ServerMessage};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::sync::SyncEngine;
use crate::view::{Banner, BoardView, Refetch, ViewPhase};

const INITIAL_BACKOFF_MS: u64 = 1_000;
const MAX_BACKOFF_MS: u64 = 10_000;
const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

// =============================================================================
// CONFIG / COMMANDS / UPDATES
// =============================================================================

pub struct Config {
    /// Base WebSocket URL, e.g. `ws://localhost:3000`.
    pub server_url: String,
    /// Raw credential passed on the handshake query string.
    pub credential: String,
    pub board_id: Uuid,
    pub join_timeout: Duration,
}

impl Config {
    #[must_use]
    pub fn new(server_url: impl Into<String>, credential: impl Into<String>, board_id: Uuid) -> Self {
        Self {
            server_url: server_url.into(),
            credential: credential.into(),
            board_id,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }

    fn ws_url(&self) -> String {
        format!("{}/api/ws?credential={}", self.server_url, self.credential)
    }
}

/// Actions the embedding UI feeds into the loop.
#[derive(Debug)]
pub enum Command {
    DragList { list_id: Uuid, to_index: usize },
    DragCard { card_id: Uuid, from_list: Uuid, to_list: Uuid, to_index: usize },
    /// Relay a CRUD notification to room peers.
    Announce(EventPayload),
    /// Retry after a failed join.
    Remount,
    /// Leave the room and stop the loop.
    Unmount,
}

/// State changes surfaced back to the embedding UI.
#[derive(Debug)]
pub enum Update {
    Banner(Banner),
    Presence(Vec<PresenceEntry>),
    /// Collections to refetch over REST, then re-hydrate the sync engine.
    RefetchNeeded(Vec<Refetch>),
    /// A move failed and the optimistic state was rolled back.
    MoveReverted,
    BoardDeleted,
    Rejected { code: RejectCode, message: String },
}

// =============================================================================
// LOOP
// =============================================================================

/// Drive one board view until `Command::Unmount` or the command channel
/// closes. Reconnects with exponential backoff on transport loss.
pub async fn run(config: Config, mut commands: mpsc::Receiver<Command>, updates: mpsc::Sender<Update>) {
    let mut view = BoardView::new(config.board_id);
    let mut sync = SyncEngine::new(config.board_id);
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    // The view mounts right away; the join itself goes out once a connection
    // is up, so failed connect attempts surface through the banner.
    view.mount();
    let _ = updates.send(Update::Banner(view.banner())).await;

    loop {
        match connect_async(config.ws_url()).await {
            Ok((socket, _)) => {
                backoff_ms = INITIAL_BACKOFF_MS;
                info!(board_id = %config.board_id, "ws connected");
                let shutdown =
                    drive_connection(&config, socket, &mut view, &mut sync, &mut commands, &updates).await;
                if shutdown {
                    return;
                }
            }
            Err(e) => {
                warn!(error = %e, "ws connect failed");
            }
        }

        view.connection_lost();
        let _ = updates.send(Update::Banner(view.banner())).await;
        let _ = updates.send(Update::Presence(Vec::new())).await;

        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
    }
}

/// Pump one live connection. Returns `true` when the loop should stop for
/// good (unmount or a closed command channel).
async fn drive_connection(
    config: &Config,
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    view: &mut BoardView,
    sync: &mut SyncEngine,
    commands: &mut mpsc::Receiver<Command>,
    updates: &mpsc::Sender<Update>,
) -> bool {
    let (mut sink, mut stream) = socket.split();

    // A pre-connect mount leaves the view in Joining with the join unsent;
    // a reconnect re-enters Joining explicitly.
    let join = match view.phase() {
        ViewPhase::Joining => Some(ClientRequest::Join { board_id: view.board_id() }),
        ViewPhase::Unmounted | ViewPhase::Errored => view.mount(),
        _ => view.reconnected(),
    };
    let mut awaiting_join = false;
    if let Some(request) = join {
        if send_request(&mut sink, &request).await.is_err() {
            return false;
        }
        awaiting_join = true;
    }
    let _ = updates.send(Update::Banner(view.banner())).await;

    let join_deadline = tokio::time::sleep(config.join_timeout);
    tokio::pin!(join_deadline);

    loop {
        tokio::select! {
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(text.as_str()) {
                            Ok(message) => {
                                if handle_server_message(message, view, sync, &mut sink, updates).await {
                                    awaiting_join = false;
                                }
                            }
                            Err(e) => warn!(error = %e, "unparseable server message"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return false,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "ws receive failed");
                        return false;
                    }
                }
            }
            command = commands.recv() => {
                let Some(command) = command else { return true };
                match command {
                    Command::Unmount => {
                        if let Some(request) = view.unmount() {
                            let _ = send_request(&mut sink, &request).await;
                        }
                        return true;
                    }
                    Command::Remount => {
                        if let Some(request) = view.mount() {
                            if send_request(&mut sink, &request).await.is_err() {
                                return false;
                            }
                            awaiting_join = true;
                            join_deadline.as_mut().reset(tokio::time::Instant::now() + config.join_timeout);
                            let _ = updates.send(Update::Banner(view.banner())).await;
                        }
                    }
                    Command::DragList { list_id, to_index } => {
                        if let Some(request) = sync.drag_list(list_id, to_index)
                            && send_request(&mut sink, &request).await.is_err()
                        {
                            return false;
                        }
                    }
                    Command::DragCard { card_id, from_list, to_list, to_index } => {
                        if let Some(request) = sync.drag_card(card_id, from_list, to_list, to_index)
                            && send_request(&mut sink, &request).await.is_err()
                        {
                            return false;
                        }
                    }
                    Command::Announce(payload) => {
                        let request = ClientRequest::Announce { payload };
                        if send_request(&mut sink, &request).await.is_err() {
                            return false;
                        }
                    }
                }
            }
            () = &mut join_deadline, if awaiting_join => {
                awaiting_join = false;
                view.join_timed_out();
                warn!(board_id = %config.board_id, "join acknowledgment timed out");
                let _ = updates.send(Update::Banner(view.banner())).await;
            }
        }
    }
}

// =============================================================================
// MESSAGE HANDLING
// =============================================================================

/// Route one server message. Returns `true` when it resolved the pending
/// join (successfully or not).
async fn handle_server_message(
    message: ServerMessage,
    view: &mut BoardView,
    sync: &mut SyncEngine,
    sink: &mut WsSink,
    updates: &mpsc::Sender<Update>,
) -> bool {
    match message {
        ServerMessage::Welcome { connection_id, .. } => {
            debug!(%connection_id, "session established");
            false
        }
        ServerMessage::JoinAck(ack) => {
            view.handle_join_ack(&ack);
            let _ = updates.send(Update::Banner(view.banner())).await;
            let _ = updates.send(Update::Presence(view.presence().to_vec())).await;
            true
        }
        ServerMessage::LeaveAck(_) => false,
        ServerMessage::ListMoveAck(ack) | ServerMessage::CardMoveAck(ack) => {
            resolve_move(ack.success, sync, sink, updates).await;
            false
        }
        ServerMessage::Broadcast(event) => {
            let is_presence = matches!(event.payload, EventPayload::BoardPresence { .. });
            let was_deleted = view.board_deleted();
            view.apply_event(&event);

            if is_presence {
                let _ = updates.send(Update::Presence(view.presence().to_vec())).await;
            }
            if view.board_deleted() && !was_deleted {
                let _ = updates.send(Update::BoardDeleted).await;
            }
            let refetches = view.take_refetches();
            if !refetches.is_empty() {
                let _ = updates.send(Update::RefetchNeeded(refetches)).await;
            }
            false
        }
        ServerMessage::Rejected { code, message } => {
            warn!(%code, reason = %message, "request rejected");
            let _ = updates.send(Update::Rejected { code, message }).await;
            resolve_move(false, sync, sink, updates).await;
            false
        }
    }
}

/// Resolve the oldest outstanding move and send whatever it unblocked.
async fn resolve_move(success: bool, sync: &mut SyncEngine, sink: &mut WsSink, updates: &mpsc::Sender<Update>) {
    let outcome = sync.ack(success);
    if outcome.reverted {
        let _ = updates.send(Update::MoveReverted).await;
    }
    for request in outcome.send_next {
        if send_request(sink, &request).await.is_err() {
            break;
        }
    }
}

async fn send_request(sink: &mut WsSink, request: &ClientRequest) -> Result<(), ()> {
    let json = match serde_json::to_string(request) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "failed to serialize request");
            return Err(());
        }
    };
    sink.send(Message::Text(json.into())).await.map_err(|e| {
        warn!(error = %e, "ws send failed");
    })
}
