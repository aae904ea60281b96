//! Broadcast event bus
//!
//! Typed pub/sub over a Tokio broadcast channel. Slow subscribers lag and
//! miss events rather than blocking publishers.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::OrchestratorEvent;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

pub struct EventBus {
    sender: broadcast::Sender<OrchestratorEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all current subscribers.
    ///
    /// Returns how many subscribers received it; zero is not an error.
    pub fn publish(&self, event: OrchestratorEvent) -> usize {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => {
                debug!(event_type, receivers = count, "Event published");
                count
            }
            Err(_) => {
                debug!(event_type, "Event published (no receivers)");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.sender.subscribe()
    }

    /// Subscribe, yielding only events that match `filter`
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver {
            receiver: self.subscribe(),
            filter,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub task_id: Option<String>,
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(mut self, task_id: &str) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }

    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    pub fn matches(&self, event: &OrchestratorEvent) -> bool {
        if let Some(ref tid) = self.task_id {
            // task-less events (learning proposals) never match a task filter
            if event.task_id() != Some(tid.as_str()) {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        true
    }
}

/// Receiver that only yields events matching its filter
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<OrchestratorEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<OrchestratorEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}
