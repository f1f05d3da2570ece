//! Live execution records and reassignment triggers.

use cadre_core::{AgentId, TaskId, TaskPriority, Timestamp};
use serde::{Deserialize, Serialize};

/// Monitoring record for one task being executed by one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExecution {
    /// Task being executed
    pub task_id: TaskId,
    /// Agent executing it
    pub agent_id: AgentId,
    /// Task type, kept for performance bookkeeping on completion
    pub task_type: String,
    /// When execution started
    pub started_at: Timestamp,
    /// Estimated duration x slack factor past the start
    pub expected_end: Timestamp,
    /// Last heartbeat received from the executing agent
    pub last_heartbeat: Timestamp,
    /// Task priority observed at assignment time
    pub priority_at_assignment: TaskPriority,
}

/// Condition warranting moving a task to a different agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Execution ran past its expected end plus the grace window
    Timeout,
    /// The executing agent stopped heartbeating
    AgentFailure,
    /// The task's priority changed after assignment
    PriorityChange,
    /// A pending higher-priority task cannot find capacity while the
    /// executing agent is comparatively idle
    LoadBalancing,
}

/// One detected reassignment condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReassignmentTrigger {
    /// Task the trigger concerns
    pub task_id: TaskId,
    /// Agent currently executing it
    pub agent_id: AgentId,
    /// What was detected
    pub kind: TriggerKind,
    /// Human-readable detail
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_kind_serializes_snake_case() {
        let json = serde_json::to_string(&TriggerKind::AgentFailure).unwrap();
        assert_eq!(json, "\"agent_failure\"");
    }
}
