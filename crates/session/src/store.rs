//! Resume-token store with per-conversation turn serialization.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

#[derive(Default)]
struct Entry {
    token: Option<String>,
    /// Held for the duration of a turn; concurrent turns on the same
    /// conversation queue here instead of racing on the token.
    turn_lock: Arc<Mutex<()>>,
}

/// Maps conversation ids to engine resume tokens.
#[derive(Default)]
pub struct SessionStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock serializing turns for one conversation. Created on first
    /// use and shared by every caller for the same id.
    pub async fn turn_lock(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        let mut entries = self.entries.lock().await;
        Arc::clone(
            &entries
                .entry(conversation_id.to_string())
                .or_default()
                .turn_lock,
        )
    }

    pub async fn token(&self, conversation_id: &str) -> Option<String> {
        let entries = self.entries.lock().await;
        entries.get(conversation_id).and_then(|e| e.token.clone())
    }

    pub async fn set_token(&self, conversation_id: &str, token: String) {
        let mut entries = self.entries.lock().await;
        entries
            .entry(conversation_id.to_string())
            .or_default()
            .token = Some(token);
    }

    /// Drop the resume token so the next turn starts a fresh session.
    /// Returns whether a token existed.
    pub async fn clear(&self, conversation_id: &str) -> bool {
        let mut entries = self.entries.lock().await;
        entries
            .get_mut(conversation_id)
            .and_then(|e| e.token.take())
            .is_some()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tokens_are_per_conversation() {
        let store = SessionStore::new();
        store.set_token("a", "t1".into()).await;
        store.set_token("b", "t2".into()).await;
        assert_eq!(store.token("a").await.as_deref(), Some("t1"));
        assert_eq!(store.token("b").await.as_deref(), Some("t2"));
        assert_eq!(store.token("c").await, None);
    }

    #[tokio::test]
    async fn clear_reports_whether_a_token_existed() {
        let store = SessionStore::new();
        store.set_token("a", "t1".into()).await;
        assert!(store.clear("a").await);
        assert!(!store.clear("a").await);
        assert_eq!(store.token("a").await, None);
    }

    #[tokio::test]
    async fn turn_lock_is_shared_per_conversation() {
        let store = SessionStore::new();
        let first = store.turn_lock("a").await;
        let second = store.turn_lock("a").await;
        let other = store.turn_lock("b").await;

        let _held = first.lock().await;
        assert!(second.try_lock().is_err());
        assert!(other.try_lock().is_ok());
    }
}
