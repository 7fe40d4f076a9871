//! Broadcast fan-out of behavior events to any number of observers.
//!
//! Built on `tokio::sync::broadcast`: every subscriber has its own cursor, so
//! a slow or dropped observer only lags itself and never blocks a loop.
//! Publishing with no active subscribers is a no-op.

use murmur_types::agent::AgentId;
use murmur_types::event::{BehaviorEvent, EventEnvelope};
use tokio::sync::broadcast;

/// Shared sink for loop state-change notifications.
///
/// Cloning shares the underlying channel, so the scheduler and every loop hold
/// their own handle.
pub struct EventBroadcaster {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBroadcaster {
    /// Create a broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Emit an event for one persona.
    pub fn broadcast(&self, agent_id: &AgentId, agent_name: &str, event: BehaviorEvent) {
        self.publish(EventEnvelope::new(agent_id.clone(), agent_name, event));
    }

    /// Fan out an already built envelope. Never fails.
    pub fn publish(&self, envelope: EventEnvelope) {
        let event_type = envelope.event.event_type();
        if let Err(e) = self.sender.send(envelope) {
            tracing::trace!(event_type, error = %e, "no event subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBroadcaster {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}
