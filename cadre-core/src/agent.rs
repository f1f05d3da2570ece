//! Scheduling-facing agent projections.
//!
//! `AgentInfo` is the read-mostly snapshot of an agent that the scheduler and
//! assignment engine score against. It is refreshed by the coordinator whenever
//! the underlying agent's real state changes; it is never owned by the agent
//! itself.

use crate::{AgentId, DurationMs, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ============================================================================
// AGENT INFO
// ============================================================================

/// Snapshot of an agent used for scheduling decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Unique identifier for this agent
    pub agent_id: AgentId,
    /// Specialization type (e.g. "frontend", "backend", "testing", "devops")
    pub agent_type: String,
    /// Capabilities this agent has
    pub capabilities: Vec<String>,
    /// Current workload, 0 (idle) to 100 (saturated)
    pub workload: u8,
    /// Maximum tasks this agent will run concurrently
    pub max_concurrent_tasks: usize,
    /// Tasks currently assigned and not yet finished
    pub current_task_count: usize,
    /// Last heartbeat timestamp
    pub last_heartbeat: Timestamp,
}

impl AgentInfo {
    /// Create a new agent snapshot with an idle workload.
    pub fn new(agent_type: &str, capabilities: Vec<String>) -> Self {
        Self {
            agent_id: Uuid::now_v7(),
            agent_type: agent_type.to_string(),
            capabilities,
            workload: 0,
            max_concurrent_tasks: 3,
            current_task_count: 0,
            last_heartbeat: Utc::now(),
        }
    }

    /// Set the workload (clamped to 100).
    pub fn with_workload(mut self, workload: u8) -> Self {
        self.workload = workload.min(100);
        self
    }

    /// Set the concurrency cap.
    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max;
        self
    }

    /// Check if the agent has a specific capability.
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Check if the agent can take one more task.
    pub fn has_capacity(&self) -> bool {
        self.current_task_count < self.max_concurrent_tasks
    }

    /// Update the heartbeat timestamp.
    pub fn heartbeat(&mut self) {
        self.last_heartbeat = Utc::now();
    }

    /// Fraction of `required` capabilities this agent covers, in 0.0..=1.0.
    /// An empty requirement list counts as fully covered.
    pub fn capability_overlap(&self, required: &[String]) -> f64 {
        if required.is_empty() {
            return 1.0;
        }
        let have = required.iter().filter(|c| self.has_capability(c)).count();
        have as f64 / required.len() as f64
    }
}

// ============================================================================
// PERFORMANCE HISTORY
// ============================================================================

/// Rolling performance record for one agent, folded in by the assignment
/// engine as executions complete. Used as the historical-performance
/// criterion in future scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPerformance {
    /// Agent this record describes
    pub agent_id: AgentId,
    /// Completed executions (successful or not)
    pub completed: u64,
    /// Failed executions
    pub failed: u64,
    /// Sum of completion durations, for the running mean
    pub total_duration_ms: DurationMs,
    /// Sum of reported quality scores, for the running mean
    pub total_quality: f64,
    /// Per-task-type specialization score in 0.0..=1.0, nudged on each outcome
    pub specialization: HashMap<String, f64>,
}

/// Starting specialization score for a task type never seen before.
const NEUTRAL_SPECIALIZATION: f64 = 0.5;
/// Nudge applied to the specialization score on success.
const SUCCESS_NUDGE: f64 = 0.05;
/// Nudge applied on failure; failures cut deeper than successes build.
const FAILURE_NUDGE: f64 = 0.10;

impl AgentPerformance {
    /// Create an empty performance record.
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            completed: 0,
            failed: 0,
            total_duration_ms: 0,
            total_quality: 0.0,
            specialization: HashMap::new(),
        }
    }

    /// Fold one finished execution into the record. `quality` is the caller's
    /// 0.0..=1.0 judgement of the result and scales the success nudge.
    pub fn record(&mut self, task_type: &str, success: bool, duration_ms: DurationMs, quality: f64) {
        self.completed += 1;
        if !success {
            self.failed += 1;
        }
        self.total_duration_ms += duration_ms.max(0);
        self.total_quality += quality.clamp(0.0, 1.0);

        let score = self
            .specialization
            .entry(task_type.to_string())
            .or_insert(NEUTRAL_SPECIALIZATION);
        if success {
            *score = (*score + SUCCESS_NUDGE * quality.clamp(0.0, 1.0)).min(1.0);
        } else {
            *score = (*score - FAILURE_NUDGE).max(0.0);
        }
    }

    /// Fraction of executions that succeeded. A fresh record scores 1.0 so
    /// new agents are not penalized before they have any history.
    pub fn success_rate(&self) -> f64 {
        if self.completed == 0 {
            return 1.0;
        }
        (self.completed - self.failed) as f64 / self.completed as f64
    }

    /// Mean completion time over all recorded executions.
    pub fn mean_completion_ms(&self) -> DurationMs {
        if self.completed == 0 {
            return 0;
        }
        self.total_duration_ms / self.completed as i64
    }

    /// Mean reported quality over all recorded executions.
    pub fn mean_quality(&self) -> f64 {
        if self.completed == 0 {
            return 1.0;
        }
        self.total_quality / self.completed as f64
    }

    /// Specialization score for a task type (neutral when unseen).
    pub fn specialization_for(&self, task_type: &str) -> f64 {
        self.specialization
            .get(task_type)
            .copied()
            .unwrap_or(NEUTRAL_SPECIALIZATION)
    }
}

// ============================================================================
// TESTS
// ============================================================================
