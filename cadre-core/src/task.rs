//! Task records and queue entries.
//!
//! A task is a unit of work with a type, priority, dependency set, and
//! lifecycle status. Tasks are created once, mutated only through the
//! scheduler/orchestrator/assignment paths, and never deleted (they are
//! retained for history and statistics).

use crate::{AgentId, DurationMs, TaskId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// STATUS AND PRIORITY
// ============================================================================

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet picked up by any agent
    Pending,
    /// An agent is actively working on it
    InProgress,
    /// Finished successfully
    Completed,
    /// Finished unsuccessfully
    Failed,
    /// Waiting on unmet dependencies
    Blocked,
}

/// Priority level of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    /// Numeric weight used for queue ordering and scoring. Higher is more urgent.
    pub const fn weight(&self) -> u8 {
        match self {
            TaskPriority::Low => 1,
            TaskPriority::Medium => 2,
            TaskPriority::High => 3,
            TaskPriority::Critical => 4,
        }
    }
}

// ============================================================================
// TASK
// ============================================================================

/// A unit of work executed by one agent against the shared workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task
    pub task_id: TaskId,
    /// Human-readable title
    pub title: String,
    /// Kind of work (e.g. "frontend", "backend", "testing", "docs")
    pub task_type: String,
    /// Current lifecycle status
    pub status: TaskStatus,
    /// Priority level
    pub priority: TaskPriority,
    /// Tasks that must complete before this one may start
    pub depends_on: Vec<TaskId>,
    /// Capabilities an agent must have to take this task
    pub required_capabilities: Vec<String>,
    /// Agent currently assigned (if any)
    pub assigned_agent: Option<AgentId>,
    /// Estimated duration in milliseconds
    pub estimated_duration_ms: DurationMs,
    /// Workspace files this task touches
    pub files: Vec<String>,
    /// When this task was created
    pub created_at: Timestamp,
    /// When an agent started working on it
    pub started_at: Option<Timestamp>,
    /// When it reached a terminal status
    pub completed_at: Option<Timestamp>,
}

impl Task {
    /// Create a new pending task.
    pub fn new(title: &str, task_type: &str) -> Self {
        Self {
            task_id: Uuid::now_v7(),
            title: title.to_string(),
            task_type: task_type.to_string(),
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            depends_on: Vec::new(),
            required_capabilities: Vec::new(),
            assigned_agent: None,
            estimated_duration_ms: 0,
            files: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Set priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set dependency task ids.
    pub fn with_dependencies(mut self, deps: Vec<TaskId>) -> Self {
        self.depends_on = deps;
        self
    }

    /// Set required capabilities.
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.required_capabilities = capabilities;
        self
    }

    /// Set the files this task touches.
    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    /// Set the estimated duration.
    pub fn with_estimated_duration(mut self, duration_ms: DurationMs) -> Self {
        self.estimated_duration_ms = duration_ms;
        self
    }

    /// Assign this task to an agent.
    pub fn assign(&mut self, agent_id: AgentId) {
        self.assigned_agent = Some(agent_id);
    }

    /// Mark the task as started by its assigned agent.
    pub fn start(&mut self) {
        self.status = TaskStatus::InProgress;
        self.started_at = Some(Utc::now());
    }

    /// Mark the task as completed.
    pub fn complete(&mut self) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the task as failed.
    pub fn fail(&mut self) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the task as blocked on unmet dependencies.
    pub fn block(&mut self) {
        self.status = TaskStatus::Blocked;
    }

    /// Return the task to the pending pool.
    ///
    /// This is the only path back to `Pending`: it clears the assigned agent
    /// and both lifecycle timestamps.
    pub fn unassign(&mut self) {
        self.status = TaskStatus::Pending;
        self.assigned_agent = None;
        self.started_at = None;
        self.completed_at = None;
    }

    /// Check whether the task has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Check whether this task names a specific required capability.
    pub fn requires_capability(&self, capability: &str) -> bool {
        self.required_capabilities.iter().any(|c| c == capability)
    }
}

// ============================================================================
// QUEUE ENTRY
// ============================================================================

/// An entry in a per-agent task queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskQueueEntry {
    /// The queued task
    pub task_id: TaskId,
    /// Priority at enqueue time
    pub priority: TaskPriority,
    /// When the entry was queued
    pub enqueued_at: Timestamp,
    /// Estimated start time derived from queue position
    pub estimated_start: Option<Timestamp>,
    /// Estimated duration carried from the task
    pub estimated_duration_ms: DurationMs,
}

impl TaskQueueEntry {
    /// Create a queue entry for a task.
    pub fn for_task(task: &Task) -> Self {
        Self {
            task_id: task.task_id,
            priority: task.priority,
            enqueued_at: Utc::now(),
            estimated_start: None,
            estimated_duration_ms: task.estimated_duration_ms,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_priority() -> impl Strategy<Value = TaskPriority> {
        prop_oneof![
            Just(TaskPriority::Low),
            Just(TaskPriority::Medium),
            Just(TaskPriority::High),
            Just(TaskPriority::Critical),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Unassign always lands the task back in the pristine pending shape,
        /// no matter what lifecycle path it took first.
        #[test]
        fn prop_unassign_restores_pending(
            priority in arb_priority(),
            steps in prop::collection::vec(0u8..4, 0..6)
        ) {
            let mut task = Task::new("generated", "backend").with_priority(priority);
            let agent = Uuid::now_v7();
            for step in steps {
                match step {
                    0 => task.assign(agent),
                    1 => task.start(),
                    2 => task.complete(),
                    _ => task.fail(),
                }
            }
            task.unassign();

            prop_assert_eq!(task.status, TaskStatus::Pending);
            prop_assert!(task.assigned_agent.is_none());
            prop_assert!(task.started_at.is_none());
            prop_assert!(task.completed_at.is_none());
        }

        /// Priority weights are strictly monotone in priority order.
        #[test]
        fn prop_priority_weight_monotone(a in arb_priority(), b in arb_priority()) {
            prop_assert_eq!(a < b, a.weight() < b.weight());
        }
    }
}
