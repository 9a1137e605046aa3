use super::*;
use serde_json::json;

#[test]
fn event_envelope_serializes_with_event_and_data_tags() {
    let board_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let list_id = Uuid::new_v4();
    let event = Event::new(
        board_id,
        user_id,
        EventPayload::ListDeleted { list_id },
    );

    let value = serde_json::to_value(&event).expect("serialize");

    assert_eq!(value["board_id"], json!(board_id.to_string()));
    assert_eq!(value["user_id"], json!(user_id.to_string()));
    assert_eq!(value["event"], json!("list:deleted"));
    assert_eq!(value["data"]["list_id"], json!(list_id.to_string()));
    assert!(value["ts"].as_i64().expect("ts present") > 0);
}

#[test]
fn card_moved_round_trip() {
    let card_id = Uuid::new_v4();
    let from_list = Uuid::new_v4();
    let to_list = Uuid::new_v4();
    let payload = EventPayload::CardMoved {
        card_id,
        from_list,
        to_list,
        source_positions: vec![ItemPosition { id: Uuid::new_v4(), order: 0 }],
        dest_positions: vec![
            ItemPosition { id: Uuid::new_v4(), order: 0 },
            ItemPosition { id: card_id, order: 1 },
        ],
    };
    let event = Event::new(Uuid::new_v4(), Uuid::new_v4(), payload.clone());

    let text = serde_json::to_string(&event).expect("serialize");
    let restored: Event = serde_json::from_str(&text).expect("deserialize");

    assert_eq!(restored.payload, payload);
    assert_eq!(restored.payload.kind(), "card:moved");
}

#[test]
fn presence_payload_carries_full_member_list() {
    let member = PresenceEntry {
        user_id: Uuid::new_v4(),
        user_email: "a@example.com".into(),
        avatar_url: None,
        joined_at: 1_700_000_000_000,
    };
    let payload = EventPayload::BoardPresence { members: vec![member.clone()], count: 1 };

    let value = serde_json::to_value(&payload).expect("serialize");

    assert_eq!(value["event"], json!("board:presence"));
    assert_eq!(value["data"]["count"], json!(1));
    assert_eq!(value["data"]["members"][0]["user_email"], json!("a@example.com"));
    // Absent avatar is omitted, not null.
    assert!(value["data"]["members"][0].get("avatar_url").is_none());

    let restored: EventPayload = serde_json::from_value(value).expect("deserialize");
    assert_eq!(restored, payload);
}

#[test]
fn client_requests_tag_on_op() {
    let board_id = Uuid::new_v4();
    let join = ClientRequest::Join { board_id };

    let value = serde_json::to_value(&join).expect("serialize");
    assert_eq!(value["op"], json!("board:join"));
    assert_eq!(value["board_id"], json!(board_id.to_string()));

    let text = format!(r#"{{"op":"board:leave","board_id":"{board_id}"}}"#);
    let restored: ClientRequest = serde_json::from_str(&text).expect("deserialize");
    assert_eq!(restored, ClientRequest::Leave { board_id });
}

#[test]
fn move_card_request_round_trip() {
    let request = ClientRequest::MoveCard {
        card_id: Uuid::new_v4(),
        from_list: Uuid::new_v4(),
        to_list: Uuid::new_v4(),
        to_index: 3,
    };

    let text = serde_json::to_string(&request).expect("serialize");
    let restored: ClientRequest = serde_json::from_str(&text).expect("deserialize");
    assert_eq!(restored, request);
}

#[test]
fn server_messages_tag_on_op() {
    let ack = ServerMessage::JoinAck(JoinAck {
        success: true,
        message: None,
        presence: Some(vec![]),
    });
    let value = serde_json::to_value(&ack).expect("serialize");
    assert_eq!(value["op"], json!("board:join"));
    assert_eq!(value["success"], json!(true));
    assert!(value.get("message").is_none());

    let rejected = ServerMessage::Rejected {
        code: RejectCode::RateLimitExceeded,
        message: "slow down".into(),
    };
    let value = serde_json::to_value(&rejected).expect("serialize");
    assert_eq!(value["op"], json!("error"));
    assert_eq!(value["code"], json!("RATE_LIMIT_EXCEEDED"));
}

#[test]
fn broadcast_message_nests_envelope_fields_inline() {
    let event = Event::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        EventPayload::BoardDeleted { board_id: Uuid::new_v4() },
    );
    let message = ServerMessage::Broadcast(event.clone());

    let text = serde_json::to_string(&message).expect("serialize");
    let value: serde_json::Value = serde_json::from_str(&text).expect("parse");
    assert_eq!(value["op"], json!("event"));
    assert_eq!(value["event"], json!("board:deleted"));

    let restored: ServerMessage = serde_json::from_str(&text).expect("deserialize");
    assert_eq!(restored, ServerMessage::Broadcast(event));
}

#[test]
fn reject_codes_serialize_screaming_snake() {
    for (code, expected) in [
        (RejectCode::AuthRequired, "AUTH_REQUIRED"),
        (RejectCode::InvalidToken, "INVALID_TOKEN"),
        (RejectCode::RateLimitExceeded, "RATE_LIMIT_EXCEEDED"),
        (RejectCode::JoinFailed, "JOIN_FAILED"),
        (RejectCode::LeaveFailed, "LEAVE_FAILED"),
        (RejectCode::PersistTransient, "PERSIST_TRANSIENT"),
        (RejectCode::PersistPermanent, "PERSIST_PERMANENT"),
        (RejectCode::InvalidRequest, "INVALID_REQUEST"),
    ] {
        assert_eq!(code.as_str(), expected);
        assert_eq!(serde_json::to_value(code).expect("serialize"), json!(expected));
    }
}

#[test]
fn category_routes_every_payload() {
    let list = ListSummary {
        id: Uuid::new_v4(),
        board_id: Uuid::new_v4(),
        title: "Backlog".into(),
        position: 0,
    };
    let card = CardSummary {
        id: Uuid::new_v4(),
        list_id: list.id,
        title: "Ship it".into(),
        description: None,
        position: 0,
    };

    assert_eq!(
        EventPayload::BoardUpdated { board: BoardSummary { id: Uuid::new_v4(), name: "b".into() } }.category(),
        EventCategory::Board
    );
    assert_eq!(
        EventPayload::BoardPresence { members: vec![], count: 0 }.category(),
        EventCategory::Presence
    );
    assert_eq!(EventPayload::ListCreated { list: list.clone() }.category(), EventCategory::List);
    assert_eq!(EventPayload::CardUpdated { card }.category(), EventCategory::Card);
}

#[test]
fn server_owned_payloads_are_flagged() {
    assert!(EventPayload::BoardPresence { members: vec![], count: 0 }.server_owned());
    assert!(EventPayload::ListMoved { board_id: Uuid::new_v4(), positions: vec![] }.server_owned());
    assert!(
        EventPayload::CardMoved {
            card_id: Uuid::new_v4(),
            from_list: Uuid::new_v4(),
            to_list: Uuid::new_v4(),
            source_positions: vec![],
            dest_positions: vec![],
        }
        .server_owned()
    );
    assert!(!EventPayload::ListDeleted { list_id: Uuid::new_v4() }.server_owned());
}
