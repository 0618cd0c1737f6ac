//! In-process typed publish/subscribe bus (§4.1).
//!
//! Ordering guarantee: events published by a single caller are delivered to
//! each handler in publish order (handlers for a topic are invoked
//! sequentially by `publish`, which awaits the whole fan-out before
//! returning). Events published concurrently from different callers race,
//! same as any other data published from multiple tasks.

use chrono::{DateTime, Utc};
use core_types::Topic;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, serde::Serialize)]
pub struct StoredEvent {
    pub id: Uuid,
    pub topic: &'static str,
    pub payload: Value,
    pub published_at: DateTime<Utc>,
}

type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Handler = Arc<dyn Fn(StoredEvent) -> HandlerFuture + Send + Sync>;

/// Typed event bus. Cheap to clone (internals are `Arc`-backed); the
/// composition root builds one instance and clones it into every component.
#[derive(Clone)]
pub struct EventBus {
    handlers: Arc<DashMap<Topic, Vec<Handler>>>,
    history: Arc<DashMap<Topic, Mutex<VecDeque<StoredEvent>>>>,
    history_capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_history_capacity(history_capacity: usize) -> Self {
        Self {
            handlers: Arc::new(DashMap::new()),
            history: Arc::new(DashMap::new()),
            history_capacity,
        }
    }

    /// Register a handler for `topic`. Handlers registered for the same
    /// topic are invoked in registration order.
    pub fn subscribe<F, Fut>(&self, topic: Topic, handler: F)
    where
        F: Fn(StoredEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed: Handler = Arc::new(move |event| Box::pin(handler(event)));
        self.handlers.entry(topic).or_default().push(boxed);
    }

    /// Publish `payload` on `topic`. Awaits every registered handler in
    /// order before returning. A handler that panics is caught and logged;
    /// it does not stop subsequent handlers from running.
    pub async fn publish(&self, topic: Topic, payload: Value) {
        let event = StoredEvent {
            id: Uuid::new_v4(),
            topic: topic.name(),
            payload,
            published_at: Utc::now(),
        };

        self.record(topic, event.clone());

        if let Some(handlers) = self.handlers.get(&topic) {
            for handler in handlers.iter() {
                let fut = handler(event.clone());
                if let Err(panic) = tokio::spawn(fut).await {
                    tracing::error!(topic = topic.name(), error = %panic, "event bus handler panicked");
                }
            }
        }
    }

    fn record(&self, topic: Topic, event: StoredEvent) {
        let mut ring = self
            .history
            .entry(topic)
            .or_insert_with(|| Mutex::new(VecDeque::with_capacity(self.history_capacity)))
            .lock()
            .expect("event bus history mutex poisoned");
        if ring.len() >= self.history_capacity {
            ring.pop_front();
        }
        ring.push_back(event);
    }

    /// Snapshot of the last events published on `topic`, oldest first.
    pub fn history(&self, topic: Topic) -> Vec<StoredEvent> {
        self.history
            .get(&topic)
            .map(|ring| ring.lock().expect("event bus history mutex poisoned").iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
