//! Normalized event envelope.

use {
    chrono::{DateTime, Utc},
    huddle_common::types::ChatMessage,
    serde::{Deserialize, Serialize},
};

/// Event kinds routable on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ChatMessage,
}

/// Typed payload carried with each event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Chat(ChatMessage),
}

/// One emitted event. Immutable once emitted; identity is the generated id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    /// Which transport adapter produced this event.
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub id: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap a chat message in a fresh envelope.
    pub fn chat(source: impl Into<String>, message: ChatMessage) -> Self {
        Self {
            kind: EventKind::ChatMessage,
            source: source.into(),
            timestamp: Utc::now(),
            id: uuid::Uuid::new_v4().to_string(),
            payload: EventPayload::Chat(message),
        }
    }
}
