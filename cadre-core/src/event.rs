//! Coordination events and the in-process event bus.
//!
//! The event vocabulary is closed: every state transition the core performs
//! is one of the `CoordinationEvent` variants below. The bus is a tokio
//! broadcast channel; publishing with zero subscribers is normal and never
//! an error.

use crate::conflict::{ConflictKind, ResolutionKind};
use crate::health::{HealthAlert, RecoveryAction};
use crate::lock::LockKind;
use crate::task::TaskStatus;
use crate::workflow::{ExecutionState, StepState};
use crate::{AgentId, ConflictId, ExecutionId, LockId, SessionId, TaskId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

// ============================================================================
// EVENT VOCABULARY
// ============================================================================

/// Every observable state transition in the coordination core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinationEvent {
    TaskStatusChanged {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
    TaskScheduled {
        task_id: TaskId,
        agent_id: AgentId,
    },
    TaskAssigned {
        task_id: TaskId,
        agent_id: AgentId,
        confidence: f64,
    },
    TaskReassigned {
        task_id: TaskId,
        from_agent: AgentId,
        to_agent: AgentId,
    },
    LockGranted {
        lock_id: LockId,
        path: String,
        holder: AgentId,
        kind: LockKind,
    },
    LockReleased {
        lock_id: LockId,
        path: String,
    },
    LockExpired {
        lock_id: LockId,
        path: String,
        holder: AgentId,
    },
    ConflictDetected {
        conflict_id: ConflictId,
        path: String,
        kind: ConflictKind,
    },
    ConflictResolved {
        conflict_id: ConflictId,
        path: String,
        strategy: ResolutionKind,
    },
    WorkflowStateChanged {
        execution_id: ExecutionId,
        from: ExecutionState,
        to: ExecutionState,
    },
    StepStateChanged {
        execution_id: ExecutionId,
        step_id: String,
        state: StepState,
    },
    HealthAlertRaised {
        alert: HealthAlert,
    },
    RecoveryAttempted {
        action: RecoveryAction,
    },
    AgentRegistered {
        agent_id: AgentId,
        agent_type: String,
    },
    AgentUnregistered {
        agent_id: AgentId,
    },
    SessionStarted {
        session_id: SessionId,
        name: String,
    },
    SessionEnded {
        session_id: SessionId,
        name: String,
    },
    ResourceAllocated {
        resource: String,
        agent_id: AgentId,
    },
    ResourceReleased {
        resource: String,
        agent_id: AgentId,
    },
}

// ============================================================================
// EVENT BUS
// ============================================================================

/// Errors surfaced to event receivers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventBusError {
    #[error("Event bus closed")]
    Closed,

    #[error("No event available")]
    Empty,

    #[error("Receiver lagged behind by {0} events")]
    Lagged(u64),
}

/// Publish-subscribe bus for coordination events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<CoordinationEvent>>,
}

impl EventBus {
    /// Create a bus that buffers up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publish an event to all subscribers. The core does not care whether
    /// anyone is listening.
    pub fn publish(&self, event: CoordinationEvent) {
        let delivered = self.sender.send(event).unwrap_or(0);
        if delivered == 0 {
            tracing::trace!("event published with no subscribers");
        }
    }

    /// Subscribe to all coordination events.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Receiver side of the event bus.
pub struct EventReceiver {
    receiver: broadcast::Receiver<CoordinationEvent>,
}

impl EventReceiver {
    /// Receive the next event, waiting until one is available.
    pub async fn recv(&mut self) -> Result<CoordinationEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                tracing::warn!(lagged = n, "event receiver fell behind");
                EventBusError::Lagged(n)
            }
        })
    }

    /// Receive without waiting.
    pub fn try_recv(&mut self) -> Result<CoordinationEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => EventBusError::Lagged(n),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new(16);
        bus.publish(CoordinationEvent::AgentUnregistered {
            agent_id: Uuid::now_v7(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let agent_id = Uuid::now_v7();
        bus.publish(CoordinationEvent::AgentRegistered {
            agent_id,
            agent_type: "backend".to_string(),
        });

        match rx.recv().await.unwrap() {
            CoordinationEvent::AgentRegistered {
                agent_id: got,
                agent_type,
            } => {
                assert_eq!(got, agent_id);
                assert_eq!(agent_type, "backend");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_try_recv_empty() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        assert_eq!(rx.try_recv().unwrap_err(), EventBusError::Empty);
    }

    #[test]
    fn test_lag_is_reported() {
        let bus = EventBus::new(1);
        let mut rx = bus.subscribe();
        for _ in 0..3 {
            bus.publish(CoordinationEvent::AgentUnregistered {
                agent_id: Uuid::now_v7(),
            });
        }
        assert!(matches!(rx.try_recv(), Err(EventBusError::Lagged(_))));
    }
}
