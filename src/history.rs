//! In-memory message history
//!
//! Append-only, insertion-ordered log replayed to every new joiner.
//! Lives for the process lifetime only.

use std::collections::VecDeque;

use crate::message::ChatMessage;

/// Ordered message log with an optional size cap
#[derive(Debug, Default)]
pub struct HistoryStore {
    messages: VecDeque<ChatMessage>,
    /// Maximum retained messages (None = unbounded)
    limit: Option<usize>,
}

impl HistoryStore {
    /// Create a store, optionally keeping only the newest `limit` messages
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            messages: VecDeque::new(),
            limit,
        }
    }

    /// Append a message, evicting the oldest if the cap is reached
    pub fn append(&mut self, message: ChatMessage) {
        if let Some(limit) = self.limit {
            if limit == 0 {
                return;
            }
            while self.messages.len() >= limit {
                self.messages.pop_front();
            }
        }
        self.messages.push_back(message);
    }

    /// Copy of the log in append order
    pub fn replay(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::types::Identity;

    fn msg(text: &str) -> ChatMessage {
        ChatMessage::new(text, Identity::parse("alice").unwrap(), Utc::now()).unwrap()
    }

    fn texts(history: &[ChatMessage]) -> Vec<&str> {
        history.iter().map(|m| m.text.as_str()).collect()
    }

    #[test]
    fn test_replay_in_append_order() {
        let mut store = HistoryStore::new(None);
        assert!(store.replay().is_empty());

        for text in ["m1", "m2", "m3"] {
            store.append(msg(text));
        }

        assert_eq!(texts(&store.replay()), vec!["m1", "m2", "m3"]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_snapshot_unaffected_by_later_appends() {
        let mut store = HistoryStore::new(None);
        store.append(msg("m1"));

        let snapshot = store.replay();
        store.append(msg("m2"));

        assert_eq!(texts(&snapshot), vec!["m1"]);
        assert_eq!(texts(&store.replay()), vec!["m1", "m2"]);
    }

    #[test]
    fn test_cap_drops_oldest() {
        let mut store = HistoryStore::new(Some(2));
        for text in ["m1", "m2", "m3"] {
            store.append(msg(text));
        }

        assert_eq!(texts(&store.replay()), vec!["m2", "m3"]);
    }

    #[test]
    fn test_zero_cap_keeps_nothing() {
        let mut store = HistoryStore::new(Some(0));
        store.append(msg("m1"));
        assert!(store.is_empty());
    }
}
