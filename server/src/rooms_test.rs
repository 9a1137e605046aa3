use super::*;
use protocol::{Event, EventPayload};
use tokio::sync::mpsc;

fn identity(email: &str) -> Identity {
    Identity { user_id: Uuid::new_v4(), user_email: email.into(), avatar_url: None }
}

async fn connect(rooms: &Rooms, identity: &Identity) -> (Uuid, mpsc::Receiver<ServerMessage>) {
    let connection_id = Uuid::new_v4();
    let (tx, rx) = mpsc::channel(8);
    rooms.register(connection_id, identity, tx).await;
    (connection_id, rx)
}

fn test_event(board_id: Uuid, user_id: Uuid) -> ServerMessage {
    ServerMessage::Broadcast(Event::new(
        board_id,
        user_id,
        EventPayload::ListDeleted { list_id: Uuid::new_v4() },
    ))
}

#[tokio::test]
async fn join_returns_full_presence_snapshot() {
    let rooms = Rooms::new();
    let board = Uuid::new_v4();
    let alice = identity("alice@example.com");
    let bob = identity("bob@example.com");

    let (conn_a, _rx_a) = connect(&rooms, &alice).await;
    let snapshot = rooms.join(conn_a, board).await.expect("join");
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].user_id, alice.user_id);

    let (conn_b, _rx_b) = connect(&rooms, &bob).await;
    let snapshot = rooms.join(conn_b, board).await.expect("join");
    assert_eq!(snapshot.len(), 2);
    // Earliest join first.
    assert_eq!(snapshot[0].user_id, alice.user_id);
    assert_eq!(snapshot[1].user_id, bob.user_id);
}

#[tokio::test]
async fn disconnect_removes_presence() {
    let rooms = Rooms::new();
    let board = Uuid::new_v4();
    let alice = identity("alice@example.com");
    let bob = identity("bob@example.com");

    let (conn_a, _rx_a) = connect(&rooms, &alice).await;
    let (conn_b, _rx_b) = connect(&rooms, &bob).await;
    rooms.join(conn_a, board).await.expect("join a");
    rooms.join(conn_b, board).await.expect("join b");
    assert_eq!(rooms.get_presence(board).await.len(), 2);

    let vacated = rooms.unregister(conn_b).await;
    assert_eq!(vacated, Some((board, bob.user_id)));

    let presence = rooms.get_presence(board).await;
    assert_eq!(presence.len(), 1);
    assert_eq!(presence[0].user_id, alice.user_id);
}

#[tokio::test]
async fn unregister_without_room_reports_nothing() {
    let rooms = Rooms::new();
    let (conn, _rx) = connect(&rooms, &identity("a@example.com")).await;

    assert!(rooms.unregister(conn).await.is_none());
    // Double unregister is harmless.
    assert!(rooms.unregister(conn).await.is_none());
}

#[tokio::test]
async fn last_leave_evicts_room() {
    let rooms = Rooms::new();
    let board = Uuid::new_v4();
    let (conn, _rx) = connect(&rooms, &identity("a@example.com")).await;

    rooms.join(conn, board).await.expect("join");
    assert!(rooms.contains_room(board).await);

    rooms.leave(conn, board).await;
    assert!(!rooms.contains_room(board).await);
    // Reads on a vacated room return empty, not an error.
    assert!(rooms.get_presence(board).await.is_empty());
}

#[tokio::test]
async fn leave_unjoined_room_is_noop() {
    let rooms = Rooms::new();
    let board = Uuid::new_v4();
    let (conn, _rx) = connect(&rooms, &identity("a@example.com")).await;

    rooms.leave(conn, board).await;
    assert!(rooms.get_presence(board).await.is_empty());
}

#[tokio::test]
async fn two_tabs_collapse_to_one_presence_entry() {
    let rooms = Rooms::new();
    let board = Uuid::new_v4();
    let user = identity("tabs@example.com");

    let (tab_one, _rx1) = connect(&rooms, &user).await;
    let (tab_two, _rx2) = connect(&rooms, &user).await;
    rooms.join(tab_one, board).await.expect("join tab one");
    rooms.join(tab_two, board).await.expect("join tab two");

    assert_eq!(rooms.get_presence(board).await.len(), 1);

    // Closing one tab keeps the user present through the other.
    rooms.leave(tab_one, board).await;
    assert_eq!(rooms.get_presence(board).await.len(), 1);

    rooms.leave(tab_two, board).await;
    assert!(rooms.get_presence(board).await.is_empty());
}

#[tokio::test]
async fn rejoin_refreshes_joined_at() {
    let rooms = Rooms::new();
    let board = Uuid::new_v4();
    let (conn, _rx) = connect(&rooms, &identity("a@example.com")).await;

    let first = rooms.join(conn, board).await.expect("join")[0].joined_at;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let second = rooms.join(conn, board).await.expect("rejoin")[0].joined_at;

    assert!(second > first);
    assert_eq!(rooms.get_presence(board).await.len(), 1);
}

#[tokio::test]
async fn switching_boards_moves_presence() {
    let rooms = Rooms::new();
    let board_one = Uuid::new_v4();
    let board_two = Uuid::new_v4();
    let (conn, _rx) = connect(&rooms, &identity("a@example.com")).await;

    rooms.join(conn, board_one).await.expect("join one");
    rooms.join(conn, board_two).await.expect("join two");

    assert!(rooms.get_presence(board_one).await.is_empty());
    assert_eq!(rooms.get_presence(board_two).await.len(), 1);
    assert_eq!(rooms.current_room(conn).await, Some(board_two));
}

#[tokio::test]
async fn emit_excludes_the_sender() {
    let rooms = Rooms::new();
    let board = Uuid::new_v4();
    let alice = identity("alice@example.com");
    let bob = identity("bob@example.com");

    let (conn_a, mut rx_a) = connect(&rooms, &alice).await;
    let (conn_b, mut rx_b) = connect(&rooms, &bob).await;
    rooms.join(conn_a, board).await.expect("join a");
    rooms.join(conn_b, board).await.expect("join b");

    let message = test_event(board, alice.user_id);
    rooms.emit(board, &message, Some(conn_a)).await;

    assert_eq!(rx_b.try_recv().expect("bob receives"), message);
    assert!(rx_a.try_recv().is_err(), "sender must not receive its own event");
}

#[tokio::test]
async fn emit_without_exclusion_reaches_everyone() {
    let rooms = Rooms::new();
    let board = Uuid::new_v4();
    let alice = identity("alice@example.com");

    let (conn_a, mut rx_a) = connect(&rooms, &alice).await;
    let (conn_b, mut rx_b) = connect(&rooms, &identity("bob@example.com")).await;
    rooms.join(conn_a, board).await.expect("join a");
    rooms.join(conn_b, board).await.expect("join b");

    rooms.emit(board, &test_event(board, alice.user_id), None).await;

    assert!(rx_a.try_recv().is_ok());
    assert!(rx_b.try_recv().is_ok());
}

#[tokio::test]
async fn emit_to_unknown_room_is_noop() {
    let rooms = Rooms::new();
    rooms.emit(Uuid::new_v4(), &test_event(Uuid::new_v4(), Uuid::new_v4()), None).await;
}

#[tokio::test]
async fn emit_skips_full_channels_without_blocking() {
    let rooms = Rooms::new();
    let board = Uuid::new_v4();
    let saturated = identity("full@example.com");
    let healthy = identity("ok@example.com");

    let connection_id = Uuid::new_v4();
    let (tx, _rx_full) = mpsc::channel(1);
    rooms.register(connection_id, &saturated, tx).await;
    rooms.join(connection_id, board).await.expect("join full");

    let (conn_ok, mut rx_ok) = connect(&rooms, &healthy).await;
    rooms.join(conn_ok, board).await.expect("join ok");

    // Fill the one-slot channel, then emit to the whole room.
    let filler = test_event(board, saturated.user_id);
    rooms.emit(board, &filler, Some(conn_ok)).await;

    let message = test_event(board, healthy.user_id);
    rooms.emit(board, &message, None).await;

    // The healthy receiver saw the second emit; the saturated one missed it.
    assert_eq!(rx_ok.try_recv().expect("healthy receives"), message);
}

#[tokio::test]
async fn presence_payload_is_complete_list_with_count() {
    let rooms = Rooms::new();
    let board = Uuid::new_v4();
    let (conn_a, _rx_a) = connect(&rooms, &identity("a@example.com")).await;
    let (conn_b, _rx_b) = connect(&rooms, &identity("b@example.com")).await;
    rooms.join(conn_a, board).await.expect("join a");
    rooms.join(conn_b, board).await.expect("join b");

    let EventPayload::BoardPresence { members, count } = rooms.presence_payload(board).await else {
        panic!("expected presence payload");
    };
    assert_eq!(count, 2);
    assert_eq!(members.len(), 2);
}

#[tokio::test]
async fn join_requires_registration() {
    let rooms = Rooms::new();
    let err = rooms.join(Uuid::new_v4(), Uuid::new_v4()).await.expect_err("must fail");
    assert!(matches!(err, RoomError::UnknownConnection(_)));
}
