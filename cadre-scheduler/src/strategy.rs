//! Scheduling strategies.
//!
//! A strategy is a pure function over immutable snapshots. The default
//! `BalancedStrategy` scores candidates on specialization, inverse workload,
//! and capability overlap; ties break on lower workload, then on agent id so
//! repeated runs over the same inputs pick the same agent.

use cadre_core::{AgentId, AgentInfo, Task};
use std::collections::HashMap;

/// Weight of the agent-type vs task-type match.
const SPECIALIZATION_WEIGHT: f64 = 0.5;
/// Weight of the inverse-workload term.
const WORKLOAD_WEIGHT: f64 = 0.3;
/// Weight of the capability-overlap term.
const CAPABILITY_WEIGHT: f64 = 0.2;

/// A pluggable task-to-agent placement decision.
pub trait SchedulingStrategy {
    /// Pick an agent for `task` among `candidates`, or decline with `None`.
    fn select_agent(
        &self,
        task: &Task,
        candidates: &[AgentId],
        agents: &HashMap<AgentId, AgentInfo>,
    ) -> Option<AgentId>;

    /// Order tasks for dispatch: priority descending, then creation time
    /// ascending. Must be a stable ordering.
    fn prioritize(&self, tasks: &mut Vec<Task>);
}

/// Default strategy: weighted specialization/workload/capability score.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalancedStrategy;

impl BalancedStrategy {
    /// Score one candidate in 0.0..=1.0.
    fn score(&self, task: &Task, agent: &AgentInfo) -> f64 {
        let specialization = if agent.agent_type == task.task_type {
            1.0
        } else {
            0.0
        };
        let workload = 1.0 - f64::from(agent.workload) / 100.0;
        let capability = agent.capability_overlap(&task.required_capabilities);

        SPECIALIZATION_WEIGHT * specialization
            + WORKLOAD_WEIGHT * workload
            + CAPABILITY_WEIGHT * capability
    }
}

impl SchedulingStrategy for BalancedStrategy {
    fn select_agent(
        &self,
        task: &Task,
        candidates: &[AgentId],
        agents: &HashMap<AgentId, AgentInfo>,
    ) -> Option<AgentId> {
        let mut best: Option<(f64, u8, AgentId)> = None;
        for id in candidates {
            let Some(agent) = agents.get(id) else {
                continue;
            };
            let score = self.score(task, agent);
            let candidate = (score, agent.workload, *id);
            best = Some(match best {
                None => candidate,
                Some(current) => {
                    // Higher score wins; ties break on lower workload, then
                    // on agent id for determinism.
                    let (cur_score, cur_load, cur_id) = current;
                    if score > cur_score
                        || (score == cur_score && agent.workload < cur_load)
                        || (score == cur_score && agent.workload == cur_load && *id < cur_id)
                    {
                        candidate
                    } else {
                        current
                    }
                }
            });
        }
        best.map(|(_, _, id)| id)
    }

    fn prioritize(&self, tasks: &mut Vec<Task>) {
        tasks.sort_by(|a, b| {
            b.priority
                .weight()
                .cmp(&a.priority.weight())
                .then(a.created_at.cmp(&b.created_at))
        });
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cadre_core::TaskPriority;

    fn pool(agents: Vec<AgentInfo>) -> (Vec<AgentId>, HashMap<AgentId, AgentInfo>) {
        let ids = agents.iter().map(|a| a.agent_id).collect();
        let map = agents.into_iter().map(|a| (a.agent_id, a)).collect();
        (ids, map)
    }

    #[test]
    fn test_specialization_dominates() {
        let frontend = AgentInfo::new("frontend", vec![]).with_workload(80);
        let backend = AgentInfo::new("backend", vec![]).with_workload(0);
        let frontend_id = frontend.agent_id;
        let (ids, agents) = pool(vec![frontend, backend]);

        let task = Task::new("Build settings page", "frontend");
        let picked = BalancedStrategy.select_agent(&task, &ids, &agents);
        assert_eq!(picked, Some(frontend_id));
    }

    #[test]
    fn test_workload_breaks_type_ties() {
        let busy = AgentInfo::new("backend", vec![]).with_workload(70);
        let idle = AgentInfo::new("backend", vec![]).with_workload(10);
        let idle_id = idle.agent_id;
        let (ids, agents) = pool(vec![busy, idle]);

        let task = Task::new("Add index", "backend");
        assert_eq!(
            BalancedStrategy.select_agent(&task, &ids, &agents),
            Some(idle_id)
        );
    }

    #[test]
    fn test_exact_tie_breaks_on_agent_id() {
        let a = AgentInfo::new("docs", vec![]).with_workload(40);
        let b = AgentInfo::new("docs", vec![]).with_workload(40);
        let expected = a.agent_id.min(b.agent_id);
        let (ids, agents) = pool(vec![a, b]);

        let task = Task::new("Changelog", "docs");
        assert_eq!(
            BalancedStrategy.select_agent(&task, &ids, &agents),
            Some(expected)
        );
    }

    #[test]
    fn test_capability_overlap_counts() {
        let full = AgentInfo::new("testing", vec!["e2e".into(), "load".into()]);
        let partial = AgentInfo::new("testing", vec!["e2e".into()]);
        let full_id = full.agent_id;
        // Same type, same workload; capability coverage decides.
        let (ids, agents) = pool(vec![partial, full]);

        let task = Task::new("Load test checkout", "testing")
            .with_capabilities(vec!["e2e".into(), "load".into()]);
        assert_eq!(
            BalancedStrategy.select_agent(&task, &ids, &agents),
            Some(full_id)
        );
    }

    #[test]
    fn test_empty_candidates_declines() {
        let task = Task::new("Anything", "devops");
        assert_eq!(
            BalancedStrategy.select_agent(&task, &[], &HashMap::new()),
            None
        );
    }

    #[test]
    fn test_prioritize_orders_by_priority_then_age() {
        let low = Task::new("A", "backend").with_priority(TaskPriority::Low);
        let critical = Task::new("B", "backend").with_priority(TaskPriority::Critical);
        let mut tasks = vec![low.clone(), critical.clone()];

        BalancedStrategy.prioritize(&mut tasks);
        assert_eq!(tasks[0].task_id, critical.task_id);
        assert_eq!(tasks[1].task_id, low.task_id);
    }

    #[test]
    fn test_prioritize_is_stable_for_equal_keys() {
        let first = Task::new("first", "docs").with_priority(TaskPriority::Medium);
        let second = Task::new("second", "docs").with_priority(TaskPriority::Medium);
        let mut tasks = vec![first.clone(), second.clone()];

        BalancedStrategy.prioritize(&mut tasks);
        assert_eq!(tasks[0].task_id, first.task_id);
        assert_eq!(tasks[1].task_id, second.task_id);
    }
}
