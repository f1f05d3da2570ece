//! Assignment engine.
//!
//! Scores candidates over six weighted criteria and keeps a monitoring
//! record per live execution. Declining to assign (no viable candidate) is a
//! valid outcome, not an error: a task whose required capability exists on no
//! candidate simply stays unassigned.

use crate::execution::{ReassignmentTrigger, TaskExecution, TriggerKind};
use cadre_core::{
    AgentId, AgentInfo, AgentPerformance, AssignmentConfig, CadreResult, CoordinationEvent,
    EventBus, Task, TaskError, TaskId, TaskStatus, Timestamp,
};
use chrono::Utc;
use std::collections::HashMap;

// ============================================================================
// RESULT
// ============================================================================

/// Outcome of a successful assignment decision.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentResult {
    /// Chosen agent
    pub agent_id: AgentId,
    /// Winning score, clamped to 0.0..=1.0
    pub confidence: f64,
    /// One line per criterion's contribution to the winning score
    pub reasoning: Vec<String>,
    /// Remaining candidates, best first
    pub runners_up: Vec<(AgentId, f64)>,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Weighted multi-criteria assignment with execution monitoring.
pub struct AssignmentEngine {
    config: AssignmentConfig,
    performance: HashMap<AgentId, AgentPerformance>,
    executions: HashMap<TaskId, TaskExecution>,
    bus: EventBus,
}

impl AssignmentEngine {
    /// Create an engine.
    pub fn new(config: AssignmentConfig, bus: EventBus) -> Self {
        Self {
            config,
            performance: HashMap::new(),
            executions: HashMap::new(),
            bus,
        }
    }

    /// Replace the scoring weights at runtime.
    pub fn set_weights(&mut self, weights: cadre_core::AssignmentWeights) -> CadreResult<()> {
        weights.validate()?;
        self.config.weights = weights;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Scoring
    // ------------------------------------------------------------------

    /// Pick the best viable agent for `task`, or `None` when no candidate
    /// carries every required capability.
    pub fn assign_task(&self, task: &Task, available: &[AgentInfo]) -> Option<AssignmentResult> {
        let viable: Vec<&AgentInfo> = available
            .iter()
            .filter(|a| {
                task.required_capabilities
                    .iter()
                    .all(|c| a.has_capability(c))
            })
            .collect();
        if viable.is_empty() {
            tracing::debug!(task_id = %task.task_id, "no viable agent for task");
            return None;
        }

        let mut scored: Vec<(f64, Vec<String>, AgentId)> = viable
            .iter()
            .map(|agent| {
                let (score, reasoning) = self.score(task, agent);
                (score, reasoning, agent.agent_id)
            })
            .collect();
        // Best score first; ties break on lower workload then agent id so
        // repeated runs over the same snapshot agree.
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let load = |id: &AgentId| {
                        viable
                            .iter()
                            .find(|v| v.agent_id == *id)
                            .map_or(100, |v| v.workload)
                    };
                    load(&a.2).cmp(&load(&b.2))
                })
                .then(a.2.cmp(&b.2))
        });

        let (confidence, reasoning, agent_id) = scored.remove(0);
        let runners_up = scored.into_iter().map(|(s, _, id)| (id, s)).collect();

        self.bus.publish(CoordinationEvent::TaskAssigned {
            task_id: task.task_id,
            agent_id,
            confidence,
        });
        Some(AssignmentResult {
            agent_id,
            confidence: confidence.clamp(0.0, 1.0),
            reasoning,
            runners_up,
        })
    }

    fn score(&self, task: &Task, agent: &AgentInfo) -> (f64, Vec<String>) {
        let w = &self.config.weights;

        let specialization = if agent.agent_type == task.task_type {
            1.0
        } else {
            0.0
        };
        let workload = 1.0 - f64::from(agent.workload) / 100.0;
        let capability = agent.capability_overlap(&task.required_capabilities);
        let priority = f64::from(task.priority.weight()) / 4.0;
        let perf = self.performance.get(&agent.agent_id);
        let time_fit = match perf.map(|p| p.mean_completion_ms()) {
            Some(mean) if mean > 0 && task.estimated_duration_ms > 0 => {
                let est = task.estimated_duration_ms as f64;
                let mean = mean as f64;
                est.min(mean) / est.max(mean)
            }
            _ => 1.0,
        };
        let history = perf.map_or(0.75, |p| {
            0.5 * p.success_rate() + 0.5 * p.specialization_for(&task.task_type)
        });

        let contributions = [
            ("specialization", w.specialization, specialization),
            ("workload_balance", w.workload_balance, workload),
            ("capability_match", w.capability_match, capability),
            ("task_priority", w.task_priority, priority),
            ("time_fit", w.time_fit, time_fit),
            ("historical_performance", w.historical_performance, history),
        ];
        let mut total = 0.0;
        let mut reasoning = Vec::with_capacity(contributions.len());
        for (name, weight, value) in contributions {
            total += weight * value;
            reasoning.push(format!("{name}: {weight:.2} x {value:.2} = {:.3}", weight * value));
        }
        (total, reasoning)
    }

    // ------------------------------------------------------------------
    // Execution monitoring
    // ------------------------------------------------------------------

    /// Record the start of a task execution.
    pub fn start_execution(&mut self, task: &Task, agent_id: AgentId) {
        let now = Utc::now();
        let expected_ms =
            (task.estimated_duration_ms.max(0) as f64 * self.config.slack_factor) as i64;
        let execution = TaskExecution {
            task_id: task.task_id,
            agent_id,
            task_type: task.task_type.clone(),
            started_at: now,
            expected_end: now + chrono::Duration::milliseconds(expected_ms),
            last_heartbeat: now,
            priority_at_assignment: task.priority,
        };
        self.executions.insert(task.task_id, execution);
    }

    /// Record a heartbeat from the agent executing `task_id`.
    pub fn record_heartbeat(&mut self, task_id: TaskId) -> CadreResult<()> {
        let execution = self
            .executions
            .get_mut(&task_id)
            .ok_or(TaskError::NotFound { task_id })?;
        execution.last_heartbeat = Utc::now();
        Ok(())
    }

    /// Record a heartbeat against every live execution held by an agent.
    pub fn record_agent_heartbeat(&mut self, agent_id: AgentId) {
        let now = Utc::now();
        for execution in self.executions.values_mut() {
            if execution.agent_id == agent_id {
                execution.last_heartbeat = now;
            }
        }
    }

    /// Live execution record for a task.
    pub fn execution(&self, task_id: TaskId) -> Option<&TaskExecution> {
        self.executions.get(&task_id)
    }

    /// Scan live executions for conditions warranting reassignment.
    /// Intended to run on a periodic tick. At most one trigger is emitted
    /// per execution, most severe condition first.
    pub fn check_for_reassignment(
        &self,
        tasks: &HashMap<TaskId, Task>,
        agents: &HashMap<AgentId, AgentInfo>,
        now: Timestamp,
    ) -> Vec<ReassignmentTrigger> {
        let heartbeat_cutoff = chrono::Duration::from_std(
            self.config.heartbeat_interval * self.config.heartbeat_miss_threshold,
        )
        .unwrap_or_else(|_| chrono::Duration::seconds(90));
        let grace = chrono::Duration::from_std(self.config.timeout_grace)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));

        let pending_priorities: Vec<u8> = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending && t.assigned_agent.is_none())
            .map(|t| t.priority.weight())
            .collect();
        let pool_has_capacity = agents.values().any(|a| a.has_capacity());

        let mut triggers = Vec::new();
        for execution in self.executions.values() {
            let trigger = if now - execution.last_heartbeat > heartbeat_cutoff {
                Some((
                    TriggerKind::AgentFailure,
                    format!(
                        "no heartbeat since {}",
                        execution.last_heartbeat.to_rfc3339()
                    ),
                ))
            } else if now > execution.expected_end + grace {
                Some((
                    TriggerKind::Timeout,
                    format!(
                        "expected to finish by {}",
                        execution.expected_end.to_rfc3339()
                    ),
                ))
            } else if tasks
                .get(&execution.task_id)
                .is_some_and(|t| t.priority != execution.priority_at_assignment)
            {
                Some((
                    TriggerKind::PriorityChange,
                    "task priority changed after assignment".to_string(),
                ))
            } else if !pool_has_capacity
                && agents
                    .get(&execution.agent_id)
                    .is_some_and(|a| a.workload < self.config.idle_workload_threshold)
                && pending_priorities
                    .iter()
                    .any(|p| *p > execution.priority_at_assignment.weight())
            {
                Some((
                    TriggerKind::LoadBalancing,
                    "higher-priority pending work cannot find capacity".to_string(),
                ))
            } else {
                None
            };

            if let Some((kind, reason)) = trigger {
                triggers.push(ReassignmentTrigger {
                    task_id: execution.task_id,
                    agent_id: execution.agent_id,
                    kind,
                    reason,
                });
            }
        }
        triggers
    }

    /// Re-run assignment for `task` excluding the agent currently executing
    /// it. On success the old execution record is closed and a new one
    /// opened against the chosen agent.
    pub fn reassign_task(
        &mut self,
        task: &Task,
        available: &[AgentInfo],
    ) -> Option<AssignmentResult> {
        let excluded = self.executions.get(&task.task_id).map(|e| e.agent_id);
        let candidates: Vec<AgentInfo> = available
            .iter()
            .filter(|a| Some(a.agent_id) != excluded)
            .cloned()
            .collect();
        let result = self.assign_task(task, &candidates)?;

        if let Some(old) = self.executions.remove(&task.task_id) {
            tracing::info!(
                task_id = %task.task_id,
                from = %old.agent_id,
                to = %result.agent_id,
                "reassigning task"
            );
            self.bus.publish(CoordinationEvent::TaskReassigned {
                task_id: task.task_id,
                from_agent: old.agent_id,
                to_agent: result.agent_id,
            });
        }
        self.start_execution(task, result.agent_id);
        Some(result)
    }

    /// Close out an execution and fold the outcome into the agent's rolling
    /// performance record.
    pub fn complete_execution(
        &mut self,
        task_id: TaskId,
        success: bool,
        quality: f64,
    ) -> CadreResult<()> {
        let execution = self
            .executions
            .remove(&task_id)
            .ok_or(TaskError::NotFound { task_id })?;
        let duration_ms = (Utc::now() - execution.started_at).num_milliseconds();

        self.performance
            .entry(execution.agent_id)
            .or_insert_with(|| AgentPerformance::new(execution.agent_id))
            .record(&execution.task_type, success, duration_ms, quality);
        Ok(())
    }

    /// Rolling performance record for an agent.
    pub fn performance_of(&self, agent_id: AgentId) -> Option<&AgentPerformance> {
        self.performance.get(&agent_id)
    }
}

// ============================================================================
// TESTS
// ============================================================================
