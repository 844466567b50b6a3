//! Normalized chat-message context shared between the event bus and router.

use serde::{Deserialize, Serialize};

/// One inbound chat message, normalized away from any platform shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Channel (or DM conversation) the message arrived on.
    pub channel: String,
    /// Platform id of the sender.
    pub sender: String,
    /// Message text with platform markup already stripped.
    pub text: String,
    /// Thread marker when the message was posted inside a thread.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
    /// True when the message arrived as a direct message.
    #[serde(default)]
    pub is_direct: bool,
    /// True when the sender is the configured owner.
    #[serde(default)]
    pub is_owner: bool,
}

impl ChatMessage {
    /// Conversation identifier used for session bookkeeping.
    /// One logical conversation per channel, threads included.
    pub fn conversation_id(&self) -> &str {
        &self.channel
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_roundtrip() {
        let msg = ChatMessage {
            channel: "C123".into(),
            sender: "U1".into(),
            text: "hello".into(),
            thread: Some("171234.5678".into()),
            is_direct: false,
            is_owner: true,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn thread_omitted_when_absent() {
        let msg = ChatMessage {
            channel: "C1".into(),
            sender: "U1".into(),
            text: "hi".into(),
            thread: None,
            is_direct: true,
            is_owner: false,
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert!(v.get("thread").is_none());
    }
}
