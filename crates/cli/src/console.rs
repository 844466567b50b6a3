//! Console transport: stdin lines become chat events, posts go to stdout.
//!
//! This is the local-run adapter; a real chat transport implements the
//! same [`Transport`] trait.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use {
    async_trait::async_trait,
    huddle_bus::{Event, EventBus},
    huddle_common::types::ChatMessage,
    huddle_routing::{MessageId, ThreadMessage, Transport},
    tokio::io::{AsyncBufReadExt, BufReader},
    tracing::debug,
};

/// Channel id used for everything typed on stdin.
pub const CONSOLE_CHANNEL: &str = "console";

#[derive(Default)]
pub struct ConsoleTransport {
    next_id: AtomicUsize,
}

impl ConsoleTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn post(
        &self,
        channel: &str,
        text: &str,
        _thread: Option<&str>,
    ) -> anyhow::Result<MessageId> {
        println!("[{channel}] {text}");
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(MessageId(id.to_string()))
    }

    async fn update(&self, channel: &str, id: &MessageId, text: &str) -> anyhow::Result<()> {
        println!("[{channel}] (edit #{}) {text}", id.0);
        Ok(())
    }

    async fn upload_file(
        &self,
        channel: &str,
        filename: &str,
        title: &str,
        content: &str,
    ) -> anyhow::Result<()> {
        println!(
            "[{channel}] (file {filename}: {title}, {} bytes)",
            content.len()
        );
        Ok(())
    }

    async fn fetch_thread(
        &self,
        _channel: &str,
        _thread: &str,
    ) -> anyhow::Result<Vec<ThreadMessage>> {
        // The console has no thread history.
        Ok(Vec::new())
    }
}

/// Read stdin line by line and emit each non-empty line as an owner chat
/// message on the bus. Returns when stdin closes.
pub async fn run_input_loop(bus: Arc<EventBus>, owner_id: String) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        debug!(text, "console input");
        let message = ChatMessage {
            channel: CONSOLE_CHANNEL.to_string(),
            sender: owner_id.clone(),
            text: text.to_string(),
            thread: None,
            is_direct: true,
            is_owner: true,
        };
        bus.emit(Event::chat("console", message)).await;
    }
}
