//! Domain event system: observability for agent runtimes and the supervisor.
//!
//! Events are published when a runtime changes lifecycle or finishes a step
//! of a trigger cycle. Subscribers (logs, status displays, tests) react
//! without coupling to the runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Why a runtime began a reply cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Addressed,
    Proactive,
    Summarize,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Addressed => "addressed",
            Self::Proactive => "proactive",
            Self::Summarize => "summarize",
        };
        f.write_str(s)
    }
}

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    RuntimeStarted {
        agent_id: String,
        timestamp: DateTime<Utc>,
    },

    RuntimeStopped {
        agent_id: String,
        timestamp: DateTime<Utc>,
    },

    /// The runtime task ended abnormally and will be restarted
    RuntimeCrashed {
        agent_id: String,
        error_message: String,
        restart_in_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The runtime could not be built from its config
    AgentFailedToStart {
        agent_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    TriggerFired {
        agent_id: String,
        kind: TriggerKind,
        message_id: String,
        timestamp: DateTime<Utc>,
    },

    ToolExecuted {
        agent_id: String,
        call_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    ReplyPosted {
        agent_id: String,
        message_id: String,
        rounds: u32,
        timestamp: DateTime<Utc>,
    },

    /// The cycle ended without a reply
    TriggerAbandoned {
        agent_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn agent_id(&self) -> &str {
        match self {
            Self::RuntimeStarted { agent_id, .. }
            | Self::RuntimeStopped { agent_id, .. }
            | Self::RuntimeCrashed { agent_id, .. }
            | Self::AgentFailedToStart { agent_id, .. }
            | Self::TriggerFired { agent_id, .. }
            | Self::ToolExecuted { agent_id, .. }
            | Self::ReplyPosted { agent_id, .. }
            | Self::TriggerAbandoned { agent_id, .. } => agent_id,
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub; slow
/// subscribers lag and lose events rather than blocking runtimes.
#[derive(Clone)]
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

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
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
            agent_id: "scout".into(),
            call_id: "r0c0".into(),
            tool_name: "web-search".into(),
            success: true,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.agent_id(), "scout");
        match event.as_ref() {
            DomainEvent::ToolExecuted { tool_name, success, .. } => {
                assert_eq!(tool_name, "web-search");
                assert!(success);
            }
            _ => panic!("Expected ToolExecuted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::TriggerAbandoned {
            agent_id: "scout".into(),
            reason: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }
}
