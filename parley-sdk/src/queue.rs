//! Bounded outbound queue for events composed while offline.
//!
//! Entries are owned by a single user id. Any access under a different
//! identity clears the queue first, so queued events never cross user
//! sessions. Overflow evicts the oldest entry; recency wins.

use std::collections::VecDeque;

use serde_json::Value;

/// Maximum queued outbound events.
pub const MAX_PENDING_MESSAGES: usize = 50;

/// One queued outbound event.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub event: String,
    pub payload: Value,
    pub owner_user_id: u64,
}

/// FIFO queue of outbound events, bounded and single-owner.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    entries: VecDeque<QueuedMessage>,
    owner: Option<u64>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an event for `owner_user_id`.
    ///
    /// Entries owned by a different user are discarded first. When the
    /// queue is full the oldest entry is evicted.
    pub fn push(&mut self, owner_user_id: u64, event: impl Into<String>, payload: Value) {
        if self.owner.is_some_and(|owner| owner != owner_user_id) {
            tracing::debug!(
                count = self.entries.len(),
                "discarding queued messages from a previous session"
            );
            self.entries.clear();
        }
        self.owner = Some(owner_user_id);

        if self.entries.len() >= MAX_PENDING_MESSAGES {
            self.entries.pop_front();
        }
        self.entries.push_back(QueuedMessage {
            event: event.into(),
            payload,
            owner_user_id,
        });
    }

    /// Drain all entries for `user_id`, preserving enqueue order.
    ///
    /// If the queue is owned by a different user the entries are dropped
    /// instead: a slow reconnect finishing after a user switch must not
    /// flush the previous user's events.
    pub fn take_for(&mut self, user_id: u64) -> Vec<QueuedMessage> {
        if self.owner != Some(user_id) {
            if !self.entries.is_empty() {
                tracing::debug!(
                    count = self.entries.len(),
                    "dropping queued messages owned by another user"
                );
            }
            self.clear();
            return Vec::new();
        }
        self.owner = None;
        self.entries.drain(..).collect()
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!(count = self.entries.len(), "clearing outbound queue");
        }
        self.entries.clear();
        self.owner = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn owner(&self) -> Option<u64> {
        self.owner
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn preserves_fifo_order() {
        let mut queue = OutboundQueue::new();
        queue.push(1, "chat:send", json!({"n": 1}));
        queue.push(1, "chat:send", json!({"n": 2}));
        queue.push(1, "chat:send", json!({"n": 3}));

        let drained = queue.take_for(1);
        let order: Vec<i64> = drained
            .iter()
            .map(|m| m.payload["n"].as_i64().unwrap())
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut queue = OutboundQueue::new();
        for n in 0..(MAX_PENDING_MESSAGES + 10) {
            queue.push(1, "chat:send", json!({ "n": n }));
        }
        assert_eq!(queue.len(), MAX_PENDING_MESSAGES);

        let drained = queue.take_for(1);
        assert_eq!(drained[0].payload["n"].as_u64().unwrap(), 10);
        assert_eq!(
            drained.last().unwrap().payload["n"].as_u64().unwrap(),
            (MAX_PENDING_MESSAGES + 9) as u64
        );
    }

    #[test]
    fn owner_switch_discards_previous_entries() {
        let mut queue = OutboundQueue::new();
        queue.push(1, "chat:send", json!({"text": "hi"}));
        queue.push(2, "chat:send", json!({"text": "yo"}));

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.owner(), Some(2));
        let drained = queue.take_for(2);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].payload["text"], "yo");
    }

    #[test]
    fn take_for_wrong_owner_drops_everything() {
        let mut queue = OutboundQueue::new();
        queue.push(1, "chat:send", json!({"text": "hi"}));

        let drained = queue.take_for(2);
        assert!(drained.is_empty());
        assert!(queue.is_empty());
        assert_eq!(queue.owner(), None);
    }
}
