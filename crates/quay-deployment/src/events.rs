//! Event broadcasting to observers
//!
//! The engine publishes through the [`EventPublisher`] trait and never waits
//! on observers. [`BroadcastPublisher`] fans events out over a broadcast
//! channel; a receiver that falls behind loses the oldest events instead of
//! slowing the sender.

use quay_types::ServiceEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// Channel capacity for the service event stream
const EVENT_CHANNEL_CAPACITY: usize = 4096;

/// Sink for service events; must not block
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: ServiceEvent);
}

/// Broadcast-channel publisher
pub struct BroadcastPublisher {
    event_tx: broadcast::Sender<ServiceEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity);
        Self { event_tx }
    }

    /// Subscribe to all events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.event_tx.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.event_tx.receiver_count()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: ServiceEvent) {
        debug!(
            kind = event.kind(),
            service = ?event.service().map(|s| s.as_str()),
            subscribers = self.event_tx.receiver_count(),
            "Publishing service event"
        );
        // Ignore errors, no subscribers is fine
        let _ = self.event_tx.send(event);
    }
}
