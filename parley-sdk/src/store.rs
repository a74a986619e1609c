//! Shared chat store the UI layer renders from.
//!
//! The session manager is the only writer for delivered events; the UI
//! reads snapshots and subscribes to a revision counter for change
//! notification. Conversations cover both rooms (keyed by room id) and
//! direct messages (keyed by an order-independent participant pair).

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::event::UserIdentity;

/// Maximum messages retained per conversation.
const MAX_MESSAGES: usize = 1000;

/// Connection state as shown to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Coarse display category for a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserKind {
    Admin,
    Mentor,
    Merchant,
    Moderator,
    Normal,
}

impl UserKind {
    /// Map a server-side role string into a display category.
    pub fn from_role(role: Option<&str>) -> Self {
        match role {
            Some("admin") => UserKind::Admin,
            Some("mentor") => UserKind::Mentor,
            Some("merchant") => UserKind::Merchant,
            Some("customer_service") | Some("moderator") => UserKind::Moderator,
            _ => UserKind::Normal,
        }
    }
}

/// One rendered chat message.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub username: String,
    pub body: String,
    pub is_own: bool,
    pub kind: UserKind,
    pub timestamp: String,
    pub message_color: Option<String>,
}

/// A room or DM conversation.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: VecDeque<ChatMessage>,
    pub unread: usize,
}

impl Conversation {
    fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            messages: VecDeque::new(),
            unread: 0,
        }
    }
}

/// Stable conversation id for a DM between two users, independent of
/// which side derives it.
pub fn conversation_id(a: u64, b: u64) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("dm:{lo}:{hi}")
}

#[derive(Default)]
struct StoreInner {
    current_user: Option<UserIdentity>,
    current_room: Option<String>,
    last_message_ids: HashMap<String, String>,
    conversations: HashMap<String, Conversation>,
    open_order: Vec<String>,
    unread_pm: HashMap<u64, u32>,
    connection: ConnectionState,
}

/// Thread-safe store shared between the session manager and the UI.
pub struct ChatStore {
    inner: Mutex<StoreInner>,
    revision: watch::Sender<u64>,
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Mutex::new(StoreInner::default()),
            revision,
        }
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    /// Subscribe to store changes. The value is a revision counter; await
    /// `changed()` and re-read whatever snapshot the UI needs.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn set_current_user(&self, user: Option<UserIdentity>) {
        self.inner.lock().current_user = user;
        self.bump();
    }

    pub fn current_user(&self) -> Option<UserIdentity> {
        self.inner.lock().current_user.clone()
    }

    /// Room the UI is currently showing. Consulted by rejoin after resume.
    pub fn set_current_room(&self, room_id: Option<String>) {
        self.inner.lock().current_room = room_id;
        self.bump();
    }

    pub fn current_room(&self) -> Option<String> {
        self.inner.lock().current_room.clone()
    }

    /// Record the newest message id seen in a room, used as the delta
    /// marker for silent rejoin.
    pub fn note_last_message_id(&self, room_id: &str, message_id: &str) {
        self.inner
            .lock()
            .last_message_ids
            .insert(room_id.to_string(), message_id.to_string());
    }

    pub fn last_message_id(&self, room_id: &str) -> Option<String> {
        self.inner.lock().last_message_ids.get(room_id).cloned()
    }

    pub fn set_connection_state(&self, state: ConnectionState) {
        let mut inner = self.inner.lock();
        if inner.connection != state {
            inner.connection = state;
            drop(inner);
            self.bump();
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.lock().connection
    }

    /// Open a conversation if it does not already exist.
    pub fn open_conversation(&self, id: &str, title: &str) {
        let mut inner = self.inner.lock();
        if !inner.conversations.contains_key(id) {
            inner
                .conversations
                .insert(id.to_string(), Conversation::new(id, title));
            inner.open_order.push(id.to_string());
            drop(inner);
            self.bump();
        }
    }

    /// Append a message to a conversation, optionally marking it unread.
    /// The conversation is created if needed.
    pub fn append_message(&self, conversation_id: &str, message: ChatMessage, mark_unread: bool) {
        let mut inner = self.inner.lock();
        if !inner.conversations.contains_key(conversation_id) {
            inner.conversations.insert(
                conversation_id.to_string(),
                Conversation::new(conversation_id, conversation_id),
            );
            inner.open_order.push(conversation_id.to_string());
        }
        if let Some(conversation) = inner.conversations.get_mut(conversation_id) {
            conversation.messages.push_back(message);
            if conversation.messages.len() > MAX_MESSAGES {
                conversation.messages.pop_front();
            }
            if mark_unread {
                conversation.unread += 1;
            }
        }
        drop(inner);
        self.bump();
    }

    pub fn increment_unread_pm(&self, from_user_id: u64) {
        *self.inner.lock().unread_pm.entry(from_user_id).or_insert(0) += 1;
        self.bump();
    }

    pub fn unread_pm(&self, from_user_id: u64) -> u32 {
        self.inner
            .lock()
            .unread_pm
            .get(&from_user_id)
            .copied()
            .unwrap_or(0)
    }

    /// Clear unread state for a conversation (the UI opened it).
    pub fn mark_read(&self, conversation_id: &str) {
        if let Some(conversation) = self.inner.lock().conversations.get_mut(conversation_id) {
            conversation.unread = 0;
        }
        self.bump();
    }

    pub fn conversation(&self, id: &str) -> Option<Conversation> {
        self.inner.lock().conversations.get(id).cloned()
    }

    /// Conversation ids in open order.
    pub fn open_conversations(&self) -> Vec<String> {
        self.inner.lock().open_order.clone()
    }

    pub fn conversation_count(&self) -> usize {
        self.inner.lock().conversations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            username: "alice".to_string(),
            body: "hello".to_string(),
            is_own: false,
            kind: UserKind::Normal,
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            message_color: None,
        }
    }

    #[test]
    fn conversation_id_is_order_independent() {
        assert_eq!(conversation_id(7, 3), conversation_id(3, 7));
        assert_eq!(conversation_id(3, 7), "dm:3:7");
        assert_eq!(conversation_id(5, 5), "dm:5:5");
    }

    #[test]
    fn role_mapping() {
        assert_eq!(UserKind::from_role(Some("admin")), UserKind::Admin);
        assert_eq!(UserKind::from_role(Some("mentor")), UserKind::Mentor);
        assert_eq!(UserKind::from_role(Some("merchant")), UserKind::Merchant);
        assert_eq!(UserKind::from_role(Some("moderator")), UserKind::Moderator);
        assert_eq!(
            UserKind::from_role(Some("customer_service")),
            UserKind::Moderator
        );
        assert_eq!(UserKind::from_role(Some("user")), UserKind::Normal);
        assert_eq!(UserKind::from_role(None), UserKind::Normal);
    }

    #[test]
    fn append_marks_unread_and_mark_read_clears() {
        let store = ChatStore::new();
        store.open_conversation("dm:1:2", "bob");
        store.append_message("dm:1:2", message("m1"), true);
        store.append_message("dm:1:2", message("m2"), true);
        assert_eq!(store.conversation("dm:1:2").unwrap().unread, 2);

        store.mark_read("dm:1:2");
        assert_eq!(store.conversation("dm:1:2").unwrap().unread, 0);
    }

    #[test]
    fn open_conversation_is_idempotent() {
        let store = ChatStore::new();
        store.open_conversation("dm:1:2", "bob");
        store.open_conversation("dm:1:2", "bob");
        assert_eq!(store.conversation_count(), 1);
        assert_eq!(store.open_conversations(), vec!["dm:1:2".to_string()]);
    }

    #[test]
    fn message_log_is_bounded() {
        let store = ChatStore::new();
        for n in 0..(MAX_MESSAGES + 5) {
            store.append_message("room1", message(&format!("m{n}")), false);
        }
        let conversation = store.conversation("room1").unwrap();
        assert_eq!(conversation.messages.len(), MAX_MESSAGES);
        assert_eq!(conversation.messages.front().unwrap().id, "m5");
    }

    #[test]
    fn revision_bumps_on_changes() {
        let store = ChatStore::new();
        let subscription = store.subscribe();
        let before = *subscription.borrow();
        store.set_current_room(Some("room1".to_string()));
        store.append_message("room1", message("m1"), false);
        assert!(*subscription.borrow() > before);
    }
}
