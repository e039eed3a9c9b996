//! In-process event bus.
//!
//! A thin wrapper over a `tokio::sync::broadcast` channel. Publishers hold a
//! cheap clonable [`EventBus`] handle and fire events without waiting for
//! acknowledgment; every subscriber receives its own copy.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

/// Sized for the startup burst, when every entry of every feed is new.
pub const DEFAULT_CAPACITY: usize = 1024;

/// An event delivered to bus subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub event_type: String,
    pub data: Map<String, Value>,
    pub time_fired: DateTime<Utc>,
}

/// Clonable handle for firing events and creating subscriptions.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Creates a bus whose subscribers may lag by at most `capacity` events
    /// before older ones are dropped for them.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Fires an event. Returns the number of subscribers it was delivered to.
    ///
    /// Having no subscribers is not an error: the event is simply dropped.
    pub fn fire(&self, event_type: &str, data: Map<String, Value>) -> usize {
        let event = Event {
            event_type: event_type.to_string(),
            data,
            time_fired: Utc::now(),
        };
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::debug!(event_type = %event_type, "Event fired with no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
