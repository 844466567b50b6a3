//! Outbound chat boundary.
//!
//! The router never talks to a chat service directly; it goes through this
//! trait so transports stay swappable and tests can record traffic.

use async_trait::async_trait;

/// Opaque handle to a posted message, used for later edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageId(pub String);

/// One message fetched from a thread.
#[derive(Debug, Clone)]
pub struct ThreadMessage {
    pub ts: String,
    pub sender: String,
    pub text: String,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Post a message, optionally into a thread.
    async fn post(
        &self,
        channel: &str,
        text: &str,
        thread: Option<&str>,
    ) -> anyhow::Result<MessageId>;

    /// Edit a previously posted message in place.
    async fn update(&self, channel: &str, id: &MessageId, text: &str) -> anyhow::Result<()>;

    /// Deliver long content as a file attachment.
    async fn upload_file(
        &self,
        channel: &str,
        filename: &str,
        title: &str,
        content: &str,
    ) -> anyhow::Result<()>;

    /// Full history of one thread, oldest first.
    async fn fetch_thread(&self, channel: &str, thread: &str)
    -> anyhow::Result<Vec<ThreadMessage>>;
}
