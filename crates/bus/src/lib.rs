//! In-process publish/subscribe router for normalized inbound events.
//!
//! Delivery is synchronous within the emitting call: handlers are awaited
//! in subscription order (type-specific first, then global) and a failing
//! handler never prevents the rest from running.

pub mod event;

pub use event::{Event, EventKind, EventPayload};

use std::collections::{HashMap, VecDeque};

use {async_trait::async_trait, tokio::sync::Mutex, tracing::warn};

/// Default bounded-history capacity.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// A subscriber on the event bus.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Human-readable name, used in failure logs.
    fn name(&self) -> &str;

    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

/// Optional per-registration predicate; events it rejects are not delivered.
pub type EventFilter = Box<dyn Fn(&Event) -> bool + Send + Sync>;

struct Registration {
    handler: std::sync::Arc<dyn EventHandler>,
    filter: Option<EventFilter>,
}

impl Registration {
    fn accepts(&self, event: &Event) -> bool {
        self.filter.as_ref().is_none_or(|f| f(event))
    }
}

/// Bus statistics computed over the bounded history ring.
#[derive(Debug, Clone, Default)]
pub struct BusStats {
    pub total_events: usize,
    pub events_by_kind: HashMap<EventKind, usize>,
    pub handler_count: usize,
}

/// The event bus. Registrations happen at wiring time; `emit` is `&self`.
pub struct EventBus {
    handlers: HashMap<EventKind, Vec<Registration>>,
    global: Vec<Registration>,
    history: Mutex<VecDeque<Event>>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            handlers: HashMap::new(),
            global: Vec::new(),
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Subscribe to one event kind.
    pub fn subscribe(
        &mut self,
        kind: EventKind,
        handler: std::sync::Arc<dyn EventHandler>,
        filter: Option<EventFilter>,
    ) {
        self.handlers
            .entry(kind)
            .or_default()
            .push(Registration { handler, filter });
    }

    /// Subscribe to every event kind.
    pub fn subscribe_all(
        &mut self,
        handler: std::sync::Arc<dyn EventHandler>,
        filter: Option<EventFilter>,
    ) {
        self.global.push(Registration { handler, filter });
    }

    /// Record the event, then deliver it to every matching handler in
    /// subscription order. Resolves only once every handler has finished
    /// or failed.
    pub async fn emit(&self, event: Event) {
        {
            let mut history = self.history.lock().await;
            if history.len() >= self.capacity {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        let typed = self.handlers.get(&event.kind).map(Vec::as_slice);
        let registrations = typed
            .unwrap_or_default()
            .iter()
            .chain(self.global.iter());

        for registration in registrations {
            if !registration.accepts(&event) {
                continue;
            }
            if let Err(e) = registration.handler.handle(&event).await {
                warn!(
                    handler = registration.handler.name(),
                    kind = ?event.kind,
                    error = %e,
                    "event handler failed"
                );
            }
        }
    }

    /// Statistics over the retained history window.
    pub async fn stats(&self) -> BusStats {
        let history = self.history.lock().await;
        let mut events_by_kind: HashMap<EventKind, usize> = HashMap::new();
        for event in history.iter() {
            *events_by_kind.entry(event.kind).or_default() += 1;
        }
        let handler_count =
            self.global.len() + self.handlers.values().map(Vec::len).sum::<usize>();
        BusStats {
            total_events: history.len(),
            events_by_kind,
            handler_count,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        huddle_common::types::ChatMessage,
        std::sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        tokio::sync::Mutex as AsyncMutex,
    };

    fn chat_event(text: &str) -> Event {
        Event::chat("test", ChatMessage {
            channel: "C1".into(),
            sender: "U1".into(),
            text: text.into(),
            thread: None,
            is_direct: false,
            is_owner: true,
        })
    }

    struct Recorder {
        label: &'static str,
        seen: Arc<AsyncMutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &str {
            self.label
        }

        async fn handle(&self, event: &Event) -> anyhow::Result<()> {
            let EventPayload::Chat(msg) = &event.payload;
            self.seen
                .lock()
                .await
                .push(format!("{}:{}", self.label, msg.text));
            Ok(())
        }
    }

    struct Failer {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventHandler for Failer {
        fn name(&self) -> &str {
            "failer"
        }

        async fn handle(&self, _event: &Event) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("boom")
        }
    }

    #[tokio::test]
    async fn history_is_bounded_fifo() {
        let bus = EventBus::with_capacity(3);
        for i in 0..5 {
            bus.emit(chat_event(&format!("m{i}"))).await;
        }
        let stats = bus.stats().await;
        assert_eq!(stats.total_events, 3);

        let history = bus.history.lock().await;
        let EventPayload::Chat(oldest) = &history.front().unwrap().payload;
        assert_eq!(oldest.text, "m2");
    }

    #[tokio::test]
    async fn typed_handlers_run_before_global() {
        let seen = Arc::new(AsyncMutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.subscribe_all(
            Arc::new(Recorder {
                label: "global",
                seen: Arc::clone(&seen),
            }),
            None,
        );
        bus.subscribe(
            EventKind::ChatMessage,
            Arc::new(Recorder {
                label: "typed",
                seen: Arc::clone(&seen),
            }),
            None,
        );

        bus.emit(chat_event("hi")).await;
        assert_eq!(*seen.lock().await, vec!["typed:hi", "global:hi"]);
    }

    #[tokio::test]
    async fn filter_rejects_delivery() {
        let seen = Arc::new(AsyncMutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.subscribe(
            EventKind::ChatMessage,
            Arc::new(Recorder {
                label: "owner-only",
                seen: Arc::clone(&seen),
            }),
            Some(Box::new(|e: &Event| {
                let EventPayload::Chat(msg) = &e.payload;
                msg.is_owner
            })),
        );

        let mut event = chat_event("blocked");
        let EventPayload::Chat(msg) = &mut event.payload;
        msg.is_owner = false;
        bus.emit(event).await;
        assert!(seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn failing_handler_does_not_stop_the_rest() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(AsyncMutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.subscribe(
            EventKind::ChatMessage,
            Arc::new(Failer {
                calls: Arc::clone(&calls),
            }),
            None,
        );
        bus.subscribe(
            EventKind::ChatMessage,
            Arc::new(Recorder {
                label: "after",
                seen: Arc::clone(&seen),
            }),
            None,
        );

        bus.emit(chat_event("hi")).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().await, vec!["after:hi"]);
    }

    #[tokio::test]
    async fn stats_counts_handlers_and_kinds() {
        let seen = Arc::new(AsyncMutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.subscribe(
            EventKind::ChatMessage,
            Arc::new(Recorder {
                label: "a",
                seen: Arc::clone(&seen),
            }),
            None,
        );
        bus.subscribe_all(
            Arc::new(Recorder {
                label: "b",
                seen,
            }),
            None,
        );
        bus.emit(chat_event("one")).await;
        bus.emit(chat_event("two")).await;

        let stats = bus.stats().await;
        assert_eq!(stats.handler_count, 2);
        assert_eq!(stats.events_by_kind[&EventKind::ChatMessage], 2);
    }
}
