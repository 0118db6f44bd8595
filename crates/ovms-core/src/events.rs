//! Named event broadcast

use tokio::sync::broadcast;
use tracing::trace;

/// Event published on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: String,
    pub data: Option<String>,
}

/// Broadcast bus for named system events
///
/// Subscribers that lag more than the channel capacity lose the oldest
/// events; signalling never blocks and never fails.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Publish an event
    pub fn signal(&self, name: &str, data: Option<String>) {
        trace!(event = name, "Signal");
        // No subscribers is fine
        let _ = self.tx.send(Event {
            name: name.to_string(),
            data,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
