//! Engine progress events
//!
//! The engine publishes an ordered event sequence on a broadcast bus;
//! the console and any other surface are pure consumers. Slow
//! subscribers miss events (lagged) rather than blocking the engine.

use crate::task::PlanSummary;
use tokio::sync::broadcast;

/// Events emitted while handling one user request
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A token of the planner's streamed classification output
    PlanToken {
        /// Text fragment
        token: String,
    },
    /// A token of a streamed chat reply
    ChatToken {
        /// Text fragment
        token: String,
    },
    /// The request was classified as a task plan
    PlanAnnounced {
        /// Task descriptions, in plan order
        tasks: Vec<String>,
    },
    /// A step is about to run
    StepStarted {
        /// 0-based step index
        index: usize,
        /// Number of steps in the plan
        total: usize,
        /// Task description
        task: String,
    },
    /// An attempt of the current step started
    AttemptStarted {
        /// 0-based step index
        index: usize,
        /// 1-based attempt number
        attempt: u32,
        /// Attempt budget
        max_attempts: u32,
    },
    /// The executor invoked a skill
    ToolInvoked {
        /// Skill name
        tool: String,
    },
    /// A step completed
    StepCompleted {
        /// 0-based step index
        index: usize,
        /// Task result
        result: String,
    },
    /// A step exhausted its retry budget
    StepFailed {
        /// 0-based step index
        index: usize,
        /// Last known failure reason
        error: String,
    },
    /// All steps resolved
    Summary {
        /// Final plan summary
        summary: PlanSummary,
    },
}

/// Broadcast-based event bus for engine progress events
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a bus with the given channel capacity.
    ///
    /// Capacity bounds how far a slow subscriber may fall behind before
    /// it starts missing events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all future events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all active subscribers.
    ///
    /// Returns the number of subscribers that received it; with no
    /// subscribers the event is dropped.
    pub fn publish(&self, event: EngineEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Current number of active subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
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
    async fn test_publish_and_subscribe() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let delivered = bus.publish(EngineEvent::PlanToken {
            token: "hello".to_string(),
        });
        assert_eq!(delivered, 1);

        match rx.recv().await.unwrap() {
            EngineEvent::PlanToken { token } => assert_eq!(token, "hello"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_dropped() {
        let bus = EventBus::default();
        assert_eq!(
            bus.publish(EngineEvent::ChatToken {
                token: "x".to_string()
            }),
            0
        );
    }
}
