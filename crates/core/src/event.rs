//! Domain event system: execution lifecycle notifications.
//!
//! The executor publishes an event at each state transition. Observers
//! (the CLI's verbose mode, tests) subscribe without coupling to the loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// An execution passed validation and started
    ExecutionStarted {
        execution_id: String,
        agent: String,
        task_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// The model produced a reply
    ResponseGenerated {
        execution_id: String,
        agent: String,
        iteration: u32,
        chars: usize,
        timestamp: DateTime<Utc>,
    },

    /// The agent had tools but named none; the loop re-prompted
    Escalated {
        execution_id: String,
        agent: String,
        /// True when the call was synthesized rather than parsed
        synthesized: bool,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        execution_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The execution reached `completed`
    ExecutionCompleted {
        execution_id: String,
        agent: String,
        iterations: u32,
        tool_calls: usize,
        timestamp: DateTime<Utc>,
    },

    /// The execution reached `error`
    ExecutionFailed {
        execution_id: String,
        agent: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// Retention cleanup ran after an execution
    MemoryPruned {
        agent: String,
        removed: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ToolExecuted {
            execution_id: "exec-1".into(),
            tool_name: "website_monitor".into(),
            success: true,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ToolExecuted { tool_name, success, .. } => {
                assert_eq!(tool_name, "website_monitor");
                assert!(success);
            }
            _ => panic!("Expected ToolExecuted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::MemoryPruned {
            agent: "monitor".into(),
            removed: 0,
            timestamp: Utc::now(),
        });
    }
}
