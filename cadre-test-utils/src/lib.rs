//! CADRE Test Utilities
//!
//! Centralized test infrastructure for the CADRE workspace:
//! - Proptest generators for the data model
//! - Mock probe, recovery handler, and step executor
//! - Fixture builders for common scenarios

// Re-export the in-memory file backend from its source crate
pub use cadre_files::InMemoryFileIo;

// Re-export core types for convenience
pub use cadre_core::{
    AgentId, AgentInfo, CadreConfig, CadreError, CadreResult, ProbeOutcome, Task, TaskId,
    TaskPriority, TaskStatus, WorkflowDefinition, WorkflowStep,
};

use async_trait::async_trait;
use cadre_core::{RecoveryKind, StepOutcome};
use cadre_health::{AgentProbe, RecoveryHandler};
use cadre_workflow::StepExecutor;
use proptest::prelude::*;
use std::collections::VecDeque;
use std::sync::Mutex;

// ============================================================================
// MOCK PROBE
// ============================================================================

/// Scripted liveness probe: pops queued outcomes, then succeeds forever.
#[derive(Debug, Default)]
pub struct MockProbe {
    script: Mutex<VecDeque<ProbeOutcome>>,
}

impl MockProbe {
    /// Probe that always succeeds.
    pub fn healthy() -> Self {
        Self::default()
    }

    /// Probe that plays back the given outcomes first.
    pub fn scripted(outcomes: Vec<ProbeOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
        }
    }

    /// Queue further outcomes mid-test.
    pub fn push(&self, outcome: ProbeOutcome) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
    }
}

#[async_trait]
impl AgentProbe for MockProbe {
    async fn check(&self, _agent_id: AgentId) -> ProbeOutcome {
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| ProbeOutcome::ok(1))
    }
}

// ============================================================================
// MOCK RECOVERY HANDLER
// ============================================================================

/// Recovery handler that records every action it is asked to apply.
#[derive(Debug, Default)]
pub struct MockRecovery {
    applied: Mutex<Vec<(AgentId, RecoveryKind)>>,
    refuse: bool,
}

impl MockRecovery {
    /// Handler that acknowledges every action.
    pub fn accepting() -> Self {
        Self::default()
    }

    /// Handler that refuses every action.
    pub fn refusing() -> Self {
        Self {
            applied: Mutex::new(Vec::new()),
            refuse: true,
        }
    }

    /// Actions applied so far.
    pub fn applied(&self) -> Vec<(AgentId, RecoveryKind)> {
        self.applied.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RecoveryHandler for MockRecovery {
    async fn apply(&self, agent_id: AgentId, kind: RecoveryKind) -> Result<(), String> {
        if let Ok(mut applied) = self.applied.lock() {
            applied.push((agent_id, kind));
        }
        if self.refuse {
            Err("mock handler refused".to_string())
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// MOCK STEP EXECUTOR
// ============================================================================

/// Step executor that pops scripted outcomes, succeeding once the script is
/// exhausted, and records which steps it ran.
#[derive(Debug, Default)]
pub struct MockStepExecutor {
    script: Mutex<VecDeque<StepOutcome>>,
    executed: Mutex<Vec<String>>,
}

impl MockStepExecutor {
    /// Executor that succeeds on every step.
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// Executor that plays back the given outcomes first.
    pub fn scripted(outcomes: Vec<StepOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Step ids executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl StepExecutor for MockStepExecutor {
    async fn execute(&self, step: &WorkflowStep, _agent_id: AgentId) -> StepOutcome {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(step.step_id.clone());
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| StepOutcome::ok(serde_json::json!({ "step": step.step_id })))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

/// Agent specialization types used across the pool.
pub fn arb_agent_type() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("frontend".to_string()),
        Just("backend".to_string()),
        Just("testing".to_string()),
        Just("docs".to_string()),
        Just("review".to_string()),
        Just("devops".to_string()),
    ]
}

/// Capability sets.
pub fn arb_capabilities() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{3,10}", 0..5)
}

/// Task priorities.
pub fn arb_priority() -> impl Strategy<Value = TaskPriority> {
    prop_oneof![
        Just(TaskPriority::Low),
        Just(TaskPriority::Medium),
        Just(TaskPriority::High),
        Just(TaskPriority::Critical),
    ]
}

/// Dependency-free tasks with random type, priority, and estimate.
pub fn arb_task() -> impl Strategy<Value = Task> {
    (arb_agent_type(), arb_priority(), 0i64..600_000).prop_map(|(task_type, priority, est)| {
        Task::new("generated task", &task_type)
            .with_priority(priority)
            .with_estimated_duration(est)
    })
}

/// Agent snapshots with random type, capabilities, and workload.
pub fn arb_agent_info() -> impl Strategy<Value = AgentInfo> {
    (arb_agent_type(), arb_capabilities(), 0u8..=100).prop_map(
        |(agent_type, capabilities, workload)| {
            AgentInfo::new(&agent_type, capabilities).with_workload(workload)
        },
    )
}

// ============================================================================
// FIXTURES
// ============================================================================

/// A small mixed-specialization agent pool.
pub fn agent_pool() -> Vec<AgentInfo> {
    vec![
        AgentInfo::new("frontend", vec!["react".to_string(), "css".to_string()]),
        AgentInfo::new("backend", vec!["rust".to_string(), "sql".to_string()]),
        AgentInfo::new("testing", vec!["e2e".to_string()]),
        AgentInfo::new("docs", vec!["markdown".to_string()]),
    ]
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_pool_covers_distinct_types() {
        let pool = agent_pool();
        let mut types: Vec<&str> = pool.iter().map(|a| a.agent_type.as_str()).collect();
        types.dedup();
        assert_eq!(types.len(), pool.len());
    }

    proptest! {
        #[test]
        fn prop_arb_task_is_well_formed(task in arb_task()) {
            prop_assert_eq!(task.status, TaskStatus::Pending);
            prop_assert!(task.estimated_duration_ms >= 0);
            prop_assert!(task.assigned_agent.is_none());
        }

        #[test]
        fn prop_arb_agent_workload_in_range(agent in arb_agent_info()) {
            prop_assert!(agent.workload <= 100);
        }
    }
}
