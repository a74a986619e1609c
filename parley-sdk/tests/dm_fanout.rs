//! Inbound fan-out: direct messages, echoes, and room messages landing
//! in the shared store.

mod common;

use common::{session, settle};
use parley_sdk::config::Platform;
use parley_sdk::event::{DirectMessage, DirectMessageEcho, LinkEvent, RoomMessage};
use parley_sdk::store::{UserKind, conversation_id};

fn dm(from: u64, to: u64, message: &str) -> DirectMessage {
    DirectMessage {
        id: Some(format!("dm_{from}_{to}")),
        from_user_id: from,
        from_username: Some(format!("user{from}")),
        from_role: None,
        to_user_id: to,
        message: message.to_string(),
        timestamp: Some("2026-08-01T10:00:00Z".to_string()),
        kind: None,
        message_color: None,
    }
}

#[tokio::test(start_paused = true)]
async fn dm_opens_conversation_and_marks_unread() {
    let (connector, _storage, handle) = session(Platform::Desktop);
    connector.set_connect_immediately(true);
    handle.init(1, "alice");
    settle().await;

    let link = connector.last_link();
    let mut incoming = dm(5, 1, "hey alice");
    incoming.from_role = Some("mentor".to_string());
    link.send(LinkEvent::DirectMessage(incoming));
    settle().await;

    let store = handle.store();
    let conversation = store.conversation(&conversation_id(1, 5)).unwrap();
    assert_eq!(conversation.title, "user5");
    assert_eq!(conversation.unread, 1);
    assert_eq!(conversation.messages.len(), 1);

    let message = conversation.messages.front().unwrap();
    assert_eq!(message.body, "hey alice");
    assert!(!message.is_own);
    assert_eq!(message.kind, UserKind::Mentor);
    assert_eq!(store.unread_pm(5), 1);
}

#[tokio::test(start_paused = true)]
async fn dm_for_another_user_is_dropped() {
    let (connector, _storage, handle) = session(Platform::Desktop);
    connector.set_connect_immediately(true);
    handle.init(1, "alice");
    settle().await;

    let link = connector.last_link();
    link.send(LinkEvent::DirectMessage(dm(5, 999, "misrouted")));
    settle().await;

    let store = handle.store();
    assert_eq!(store.conversation_count(), 0);
    assert_eq!(store.unread_pm(5), 0);
}

#[tokio::test(start_paused = true)]
async fn dm_without_sender_username_is_dropped() {
    let (connector, _storage, handle) = session(Platform::Desktop);
    connector.set_connect_immediately(true);
    handle.init(1, "alice");
    settle().await;

    let link = connector.last_link();
    let mut incoming = dm(5, 1, "anonymous");
    incoming.from_username = None;
    link.send(LinkEvent::DirectMessage(incoming));
    settle().await;

    assert_eq!(handle.store().conversation_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn dm_with_empty_body_is_dropped() {
    let (connector, _storage, handle) = session(Platform::Desktop);
    connector.set_connect_immediately(true);
    handle.init(1, "alice");
    settle().await;

    let link = connector.last_link();
    link.send(LinkEvent::DirectMessage(dm(5, 1, "")));
    settle().await;

    assert_eq!(handle.store().conversation_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn dm_without_id_gets_a_fallback_id() {
    let (connector, _storage, handle) = session(Platform::Desktop);
    connector.set_connect_immediately(true);
    handle.init(1, "alice");
    settle().await;

    let link = connector.last_link();
    let mut incoming = dm(5, 1, "no id");
    incoming.id = None;
    link.send(LinkEvent::DirectMessage(incoming));
    settle().await;

    let conversation = handle.store().conversation(&conversation_id(1, 5)).unwrap();
    assert!(conversation.messages.front().unwrap().id.starts_with("pm_"));
}

#[tokio::test(start_paused = true)]
async fn sent_echo_is_own_and_never_unread() {
    let (connector, _storage, handle) = session(Platform::Desktop);
    connector.set_connect_immediately(true);
    handle.init(1, "alice");
    settle().await;

    let link = connector.last_link();
    link.send(LinkEvent::DirectMessageEcho(DirectMessageEcho {
        id: None,
        to_user_id: 5,
        to_username: Some("user5".to_string()),
        message: "hi there".to_string(),
        timestamp: None,
    }));
    settle().await;

    let store = handle.store();
    let conversation = store.conversation(&conversation_id(1, 5)).unwrap();
    assert_eq!(conversation.unread, 0);
    let message = conversation.messages.front().unwrap();
    assert!(message.is_own);
    assert_eq!(message.username, "alice");
    assert_eq!(store.unread_pm(5), 0);
}

#[tokio::test(start_paused = true)]
async fn dm_and_echo_share_one_conversation() {
    let (connector, _storage, handle) = session(Platform::Desktop);
    connector.set_connect_immediately(true);
    handle.init(1, "alice");
    settle().await;

    let link = connector.last_link();
    link.send(LinkEvent::DirectMessage(dm(5, 1, "ping")));
    link.send(LinkEvent::DirectMessageEcho(DirectMessageEcho {
        id: None,
        to_user_id: 5,
        to_username: Some("user5".to_string()),
        message: "pong".to_string(),
        timestamp: None,
    }));
    settle().await;

    let store = handle.store();
    assert_eq!(store.conversation_count(), 1);
    let conversation = store.conversation(&conversation_id(1, 5)).unwrap();
    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(conversation.unread, 1);
}

#[tokio::test(start_paused = true)]
async fn room_message_advances_last_seen_marker() {
    let (connector, _storage, handle) = session(Platform::Desktop);
    connector.set_connect_immediately(true);
    handle.init(1, "alice");
    settle().await;
    handle.store().set_current_room(Some("lobby".to_string()));

    let link = connector.last_link();
    link.send(LinkEvent::RoomMessage(RoomMessage {
        id: "m7".to_string(),
        room_id: "lobby".to_string(),
        user_id: 3,
        username: "bob".to_string(),
        message: "welcome".to_string(),
        role: None,
        timestamp: None,
    }));
    settle().await;

    let store = handle.store();
    assert_eq!(store.last_message_id("lobby").as_deref(), Some("m7"));

    // The marker rides along on the next silent rejoin.
    link.go_down("flaky network");
    settle().await;
    link.clear_emitted();
    link.go_up();
    settle().await;
    let rejoin = link.emitted_payload("room:silent_rejoin").unwrap();
    assert_eq!(rejoin["lastMessageId"], "m7");
}

#[tokio::test(start_paused = true)]
async fn active_room_message_is_not_unread() {
    let (connector, _storage, handle) = session(Platform::Desktop);
    connector.set_connect_immediately(true);
    handle.init(1, "alice");
    settle().await;
    handle.store().set_current_room(Some("lobby".to_string()));

    let link = connector.last_link();
    link.send(LinkEvent::RoomMessage(RoomMessage {
        id: "m1".to_string(),
        room_id: "lobby".to_string(),
        user_id: 3,
        username: "bob".to_string(),
        message: "visible".to_string(),
        role: None,
        timestamp: None,
    }));
    link.send(LinkEvent::RoomMessage(RoomMessage {
        id: "m2".to_string(),
        room_id: "backstage".to_string(),
        user_id: 3,
        username: "bob".to_string(),
        message: "hidden".to_string(),
        role: None,
        timestamp: None,
    }));
    settle().await;

    let store = handle.store();
    assert_eq!(store.conversation("lobby").unwrap().unread, 0);
    assert_eq!(store.conversation("backstage").unwrap().unread, 1);
}
