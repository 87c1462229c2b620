//! Per-session conversation memory.
//!
//! Each session keeps its most recent user/assistant turns, bounded to
//! `max_messages` entries. Appends are atomic per store: the read, extend
//! and truncate happen under one lock, so concurrent requests on the same
//! session never lose a turn.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::Message;

/// Session id used when a request does not name one.
pub const DEFAULT_SESSION: &str = "default";

pub trait SessionStore: Send + Sync {
    /// Stored turns for `session_id`, oldest first.
    fn history(&self, session_id: &str) -> Vec<Message>;

    /// Append `messages` and drop the oldest entries beyond the bound.
    fn append(&self, session_id: &str, messages: Vec<Message>);
}

/// Record one question/answer exchange.
pub fn record_exchange(store: &dyn SessionStore, session_id: &str, query: &str, answer: &str) {
    store.append(
        session_id,
        vec![Message::user(query), Message::assistant(answer)],
    );
}

pub struct InMemorySessionStore {
    max_messages: usize,
    sessions: Mutex<HashMap<String, Vec<Message>>>,
}

impl InMemorySessionStore {
    pub fn new(max_messages: usize) -> Self {
        Self {
            max_messages: max_messages.max(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

impl SessionStore for InMemorySessionStore {
    fn history(&self, session_id: &str) -> Vec<Message> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.get(session_id).cloned().unwrap_or_default()
    }

    fn append(&self, session_id: &str, messages: Vec<Message>) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let turns = sessions.entry(session_id.to_string()).or_default();
        turns.extend(messages);
        if turns.len() > self.max_messages {
            let excess = turns.len() - self.max_messages;
            turns.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use std::sync::Arc;

    #[test]
    fn test_accumulates_alternating_turns() {
        let store = InMemorySessionStore::new(20);
        record_exchange(&store, "s1", "q1", "a1");
        record_exchange(&store, "s1", "q2", "a2");
        let history = store.history("s1");
        let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(history[2].content.as_deref(), Some("q2"));
        assert!(store.history("other").is_empty());
    }

    #[test]
    fn test_truncates_to_most_recent() {
        let store = InMemorySessionStore::new(3);
        record_exchange(&store, "s", "q1", "a1");
        record_exchange(&store, "s", "q2", "a2");
        let history = store.history("s");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content.as_deref(), Some("a1"));
        assert_eq!(history[2].content.as_deref(), Some("a2"));
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        let store = Arc::new(InMemorySessionStore::new(1000));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for j in 0..10 {
                        record_exchange(store.as_ref(), "shared", &format!("q{i}-{j}"), "a");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.history("shared").len(), 160);
    }
}
