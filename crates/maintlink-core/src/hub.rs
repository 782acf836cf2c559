//! Event hub: the single fan-out surface of the console.
//!
//! Two ways to listen:
//! - synchronous handlers registered with a filter, called inline on
//!   publish (outside the registry lock)
//! - a [`broadcast`] receiver for async consumers and tests
//!
//! A panicking handler is caught and logged; it never unwinds into the
//! queue worker, the probe cycle, or the stream reader that published.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::model::{ConsoleEvent, EventCategory, StreamEventKind};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Handle for removing a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.0.simple().to_string();
        write!(f, "Sub({})", id.get(..8).unwrap_or(&id))
    }
}

/// Which events a handler receives.
#[derive(Debug, Clone, Default)]
pub enum EventFilter {
    #[default]
    All,
    Categories(Vec<EventCategory>),
    /// Only feed events of these kinds.
    StreamKinds(Vec<StreamEventKind>),
}

impl EventFilter {
    pub fn matches(&self, event: &ConsoleEvent) -> bool {
        match self {
            Self::All => true,
            Self::Categories(categories) => categories.contains(&event.category()),
            Self::StreamKinds(kinds) => match event {
                ConsoleEvent::Stream(stream_event) => kinds.contains(&stream_event.kind()),
                _ => false,
            },
        }
    }
}

type EventHandler = Arc<dyn Fn(&ConsoleEvent) + Send + Sync>;

/// Registry of handlers plus the broadcast sender.
pub struct EventHub {
    sender: broadcast::Sender<ConsoleEvent>,
    handlers: RwLock<HashMap<SubscriptionId, (EventFilter, EventHandler)>>,
}

impl EventHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sender,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register `handler` for events matching `filter`.
    pub fn register<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&ConsoleEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.handlers.write().insert(id, (filter, Arc::new(handler)));
        tracing::debug!(subscription = %id, "event handler registered");
        id
    }

    /// Remove a handler. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.handlers.write().remove(&id).is_some()
    }

    /// Async receiver for every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.sender.subscribe()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Deliver `event` to matching handlers, then to broadcast receivers.
    pub fn publish(&self, event: ConsoleEvent) {
        let matching: Vec<(SubscriptionId, EventHandler)> = self
            .handlers
            .read()
            .iter()
            .filter(|(_, (filter, _))| filter.matches(&event))
            .map(|(id, (_, handler))| (*id, Arc::clone(handler)))
            .collect();

        for (id, handler) in matching {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                tracing::error!(
                    subscription = %id,
                    category = ?event.category(),
                    "event handler panicked"
                );
            }
        }

        // No receivers is fine
        let _ = self.sender.send(event);
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
