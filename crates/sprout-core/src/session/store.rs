//! Thread-safe per-user message accumulation.
//!
//! `SessionStore` maps a user id to the ordered messages exchanged since the
//! last conversation boundary. DashMap gives a per-shard critical section, so
//! appends for one user serialize at the lock while different users proceed
//! concurrently. No I/O happens while an entry lock is held.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use sprout_types::conversation::ConversationMessage;

/// One user's in-flight session: messages since the last boundary.
struct SessionEntry {
    messages: Vec<ConversationMessage>,
    last_activity: DateTime<Utc>,
}

/// Thread-safe map from user id to an appendable message list.
///
/// Sessions are created on first append, snapshotted for finalization, and
/// cleared exactly once by the finalize pipeline (`clear` is idempotent so a
/// racing second clear is a no-op).
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, SessionEntry>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append messages to the user's session, creating it if absent.
    ///
    /// Messages from concurrent appends for the same user keep their arrival
    /// order at the entry lock; a single call's messages stay adjacent.
    pub fn append(&self, user_id: &str, messages: Vec<ConversationMessage>) {
        let mut entry = self
            .sessions
            .entry(user_id.to_string())
            .or_insert_with(|| SessionEntry {
                messages: Vec::new(),
                last_activity: Utc::now(),
            });
        entry.messages.extend(messages);
        entry.last_activity = Utc::now();
    }

    /// An immutable copy of the user's current messages (empty if absent).
    ///
    /// Later appends do not affect a returned snapshot.
    pub fn snapshot(&self, user_id: &str) -> Vec<ConversationMessage> {
        self.sessions
            .get(user_id)
            .map(|entry| entry.messages.clone())
            .unwrap_or_default()
    }

    /// Remove the user's session. Idempotent.
    pub fn clear(&self, user_id: &str) {
        self.sessions.remove(user_id);
    }

    /// Atomically snapshot and clear the user's session.
    ///
    /// Used by the finalize pipeline so a message appended between a separate
    /// snapshot and a separate clear cannot be lost.
    pub fn snapshot_and_clear(&self, user_id: &str) -> Vec<ConversationMessage> {
        self.sessions
            .remove(user_id)
            .map(|(_, entry)| entry.messages)
            .unwrap_or_default()
    }

    /// Whether the user has a non-empty in-flight session.
    pub fn has_session(&self, user_id: &str) -> bool {
        self.sessions
            .get(user_id)
            .map(|entry| !entry.messages.is_empty())
            .unwrap_or(false)
    }

    /// When the user's session last saw an append.
    pub fn last_activity(&self, user_id: &str) -> Option<DateTime<Utc>> {
        self.sessions.get(user_id).map(|entry| entry.last_activity)
    }

    /// Number of messages currently held for the user.
    pub fn message_count(&self, user_id: &str) -> usize {
        self.sessions
            .get(user_id)
            .map(|entry| entry.messages.len())
            .unwrap_or(0)
    }

    /// Number of users with an in-flight session.
    pub fn user_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprout_types::conversation::Sender;
    use std::sync::Arc;

    fn pair(n: usize) -> Vec<ConversationMessage> {
        vec![
            ConversationMessage::child(format!("question {n}")),
            ConversationMessage::assistant(format!("answer {n}")),
        ]
    }

    #[test]
    fn append_then_snapshot_returns_appended_sequence() {
        let store = SessionStore::new();
        store.append("u1", pair(1));
        store.append("u1", pair(2));

        let snapshot = store.snapshot("u1");
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot[0].text, "question 1");
        assert_eq!(snapshot[1].text, "answer 1");
        assert_eq!(snapshot[2].text, "question 2");
        assert_eq!(snapshot[3].text, "answer 2");
    }

    #[test]
    fn snapshot_is_unaffected_by_later_appends() {
        let store = SessionStore::new();
        store.append("u1", pair(1));
        let snapshot = store.snapshot("u1");
        store.append("u1", pair(2));

        assert_eq!(snapshot.len(), 2);
        assert_eq!(store.snapshot("u1").len(), 4);
    }

    #[test]
    fn snapshot_of_unknown_user_is_empty() {
        let store = SessionStore::new();
        assert!(store.snapshot("nobody").is_empty());
    }

    #[test]
    fn clear_then_snapshot_is_empty_and_clear_is_idempotent() {
        let store = SessionStore::new();
        store.append("u1", pair(1));

        store.clear("u1");
        assert!(store.snapshot("u1").is_empty());

        // Second clear is a no-op
        store.clear("u1");
        assert!(store.snapshot("u1").is_empty());
        assert!(!store.has_session("u1"));
    }

    #[test]
    fn snapshot_and_clear_returns_messages_and_empties_store() {
        let store = SessionStore::new();
        store.append("u1", pair(1));

        let taken = store.snapshot_and_clear("u1");
        assert_eq!(taken.len(), 2);
        assert!(store.snapshot("u1").is_empty());

        // A second call finds nothing
        assert!(store.snapshot_and_clear("u1").is_empty());
    }

    #[test]
    fn users_are_isolated() {
        let store = SessionStore::new();
        store.append("u1", pair(1));
        store.append("u2", pair(2));

        store.clear("u1");
        assert!(store.snapshot("u1").is_empty());
        assert_eq!(store.snapshot("u2").len(), 2);
        assert_eq!(store.user_count(), 1);
    }

    #[test]
    fn has_session_tracks_content() {
        let store = SessionStore::new();
        assert!(!store.has_session("u1"));
        store.append("u1", pair(1));
        assert!(store.has_session("u1"));
        assert!(store.last_activity("u1").is_some());
    }

    #[tokio::test]
    async fn concurrent_appends_lose_nothing_and_keep_pairs_adjacent() {
        let store = Arc::new(SessionStore::new());
        let mut handles = Vec::new();

        for n in 0..50 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.append("u1", pair(n));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = store.snapshot("u1");
        assert_eq!(snapshot.len(), 100);

        // Each append call's pair stays adjacent regardless of interleaving
        for chunk in snapshot.chunks(2) {
            assert_eq!(chunk[0].sender, Sender::Child);
            assert_eq!(chunk[1].sender, Sender::Assistant);
            let n = chunk[0].text.strip_prefix("question ").unwrap();
            assert_eq!(chunk[1].text, format!("answer {n}"));
        }
    }
}
