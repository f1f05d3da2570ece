//! Task scheduler.
//!
//! Owns the task records, the dependency graph, and one priority queue per
//! agent. Placement decisions are delegated to the configured strategy;
//! everything here is bookkeeping around those decisions.

use crate::strategy::{BalancedStrategy, SchedulingStrategy};
use cadre_core::{
    AgentError, AgentId, AgentInfo, CadreResult, CoordinationEvent, EventBus, SchedulerConfig,
    Task, TaskError, TaskId, TaskQueueEntry, TaskStatus, Timestamp,
};
use cadre_graph::{DependencyGraph, TaskQueue};
use chrono::Utc;
use std::collections::{HashMap, HashSet};

// ============================================================================
// OUTCOME
// ============================================================================

/// Result of a placement attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleOutcome {
    /// Dependencies unmet; the task was marked blocked.
    Blocked { missing: Vec<TaskId> },
    /// The strategy declined every candidate (e.g. all agents overloaded).
    NoAgent,
    /// Queued on an agent with an estimated start time.
    Scheduled {
        agent_id: AgentId,
        estimated_start: Timestamp,
    },
}

// ============================================================================
// SCHEDULER
// ============================================================================

/// Dependency-aware, strategy-driven task scheduler.
pub struct TaskScheduler {
    tasks: HashMap<TaskId, Task>,
    graph: DependencyGraph,
    queues: HashMap<AgentId, TaskQueue>,
    agents: HashMap<AgentId, AgentInfo>,
    strategy: Box<dyn SchedulingStrategy + Send + Sync>,
    config: SchedulerConfig,
    bus: EventBus,
}

impl TaskScheduler {
    /// Create a scheduler with the default balanced strategy.
    pub fn new(config: SchedulerConfig, bus: EventBus) -> Self {
        Self::with_strategy(config, bus, Box::new(BalancedStrategy))
    }

    /// Create a scheduler with a caller-supplied strategy.
    pub fn with_strategy(
        config: SchedulerConfig,
        bus: EventBus,
        strategy: Box<dyn SchedulingStrategy + Send + Sync>,
    ) -> Self {
        Self {
            tasks: HashMap::new(),
            graph: DependencyGraph::new(),
            queues: HashMap::new(),
            agents: HashMap::new(),
            strategy,
            config,
            bus,
        }
    }

    // ------------------------------------------------------------------
    // Agent pool
    // ------------------------------------------------------------------

    /// Make an agent known to the scheduler and rebalance.
    pub fn register_agent(&mut self, info: AgentInfo) -> CadreResult<()> {
        if self.agents.contains_key(&info.agent_id) {
            return Err(AgentError::AlreadyRegistered {
                agent_id: info.agent_id,
            }
            .into());
        }
        let agent_id = info.agent_id;
        self.agents.insert(agent_id, info);
        self.queues.entry(agent_id).or_default();
        self.rebalance();
        Ok(())
    }

    /// Forget an agent; its queued tasks return to the pool and rebalance.
    pub fn unregister_agent(&mut self, agent_id: AgentId) -> CadreResult<()> {
        if self.agents.remove(&agent_id).is_none() {
            return Err(AgentError::NotRegistered { agent_id }.into());
        }
        if let Some(mut queue) = self.queues.remove(&agent_id) {
            for entry in queue.drain() {
                if let Some(task) = self.tasks.get_mut(&entry.task_id) {
                    task.unassign();
                }
            }
        }
        self.rebalance();
        Ok(())
    }

    /// Refresh an agent snapshot. Crossing the overload threshold triggers
    /// a rebalance.
    pub fn update_agent(&mut self, info: AgentInfo) -> CadreResult<()> {
        let previous = self
            .agents
            .get(&info.agent_id)
            .ok_or(AgentError::NotRegistered {
                agent_id: info.agent_id,
            })?;
        let was_overloaded = previous.workload >= self.config.overload_threshold;
        let is_overloaded = info.workload >= self.config.overload_threshold;
        self.agents.insert(info.agent_id, info);
        if was_overloaded != is_overloaded {
            self.rebalance();
        }
        Ok(())
    }

    /// Snapshot of the known agents.
    pub fn agents_snapshot(&self) -> HashMap<AgentId, AgentInfo> {
        self.agents.clone()
    }

    // ------------------------------------------------------------------
    // Task records
    // ------------------------------------------------------------------

    /// Add a task and its dependency edges. Edges that would close a cycle
    /// reject the whole task; previously inserted edges are rolled back.
    pub fn add_task(&mut self, task: Task) -> CadreResult<()> {
        let mut inserted = Vec::new();
        for dep in &task.depends_on {
            if let Err(e) = self.graph.add_dependency(task.task_id, *dep) {
                for done in inserted {
                    self.graph.remove_dependency(task.task_id, done);
                }
                return Err(e);
            }
            inserted.push(*dep);
        }
        self.tasks.insert(task.task_id, task);
        Ok(())
    }

    /// Look up a task by id.
    pub fn task(&self, task_id: TaskId) -> Option<&Task> {
        self.tasks.get(&task_id)
    }

    /// Snapshot of all task records.
    pub fn tasks_snapshot(&self) -> HashMap<TaskId, Task> {
        self.tasks.clone()
    }

    /// Ids of all completed tasks.
    pub fn completed_set(&self) -> HashSet<TaskId> {
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.task_id)
            .collect()
    }

    // ------------------------------------------------------------------
    // Placement
    // ------------------------------------------------------------------

    /// Place a task: blocked if dependencies are unmet, otherwise queued on
    /// the agent the strategy picks.
    pub fn schedule_task(&mut self, task_id: TaskId) -> CadreResult<ScheduleOutcome> {
        let completed = self.completed_set();
        let task = self
            .tasks
            .get(&task_id)
            .ok_or(TaskError::NotFound { task_id })?
            .clone();

        if !self.graph.dependencies_met(task_id, &completed) {
            let missing = self.graph.missing_dependencies(task_id, &completed);
            self.set_status(task_id, TaskStatus::Blocked);
            return Ok(ScheduleOutcome::Blocked { missing });
        }

        // Re-scheduling an already-queued task moves it rather than
        // duplicating it.
        if let Some(prev) = task.assigned_agent {
            if let Some(queue) = self.queues.get_mut(&prev) {
                queue.remove(task_id);
            }
        }

        let candidates: Vec<AgentId> = self
            .agents
            .values()
            .filter(|a| a.workload < self.config.overload_threshold && a.has_capacity())
            .map(|a| a.agent_id)
            .collect();

        let Some(agent_id) = self.strategy.select_agent(&task, &candidates, &self.agents) else {
            return Ok(ScheduleOutcome::NoAgent);
        };

        let queue = self.queues.entry(agent_id).or_default();
        let entry = TaskQueueEntry::for_task(&task);
        let pos = queue.insert(entry);
        let wait_ms = queue.estimated_wait_before(pos);
        let estimated_start = Utc::now() + chrono::Duration::milliseconds(wait_ms);

        let mut was_blocked = false;
        if let Some(record) = self.tasks.get_mut(&task_id) {
            if record.status == TaskStatus::Blocked {
                record.status = TaskStatus::Pending;
                was_blocked = true;
            }
            record.assign(agent_id);
        }
        if was_blocked {
            self.bus.publish(CoordinationEvent::TaskStatusChanged {
                task_id,
                from: TaskStatus::Blocked,
                to: TaskStatus::Pending,
            });
        }
        tracing::debug!(task_id = %task_id, agent_id = %agent_id, position = pos, "task queued");
        self.bus
            .publish(CoordinationEvent::TaskScheduled { task_id, agent_id });

        Ok(ScheduleOutcome::Scheduled {
            agent_id,
            estimated_start,
        })
    }

    /// Pop the first queued task for `agent_id` whose dependencies are all
    /// satisfied. Earlier entries may still be blocked, so the scan moves
    /// forward rather than stopping at the queue head.
    pub fn next_task_for(&mut self, agent_id: AgentId) -> Option<Task> {
        let completed = self.completed_set();
        let graph = &self.graph;
        let queue = self.queues.get_mut(&agent_id)?;
        let index = queue
            .iter()
            .position(|e| graph.dependencies_met(e.task_id, &completed))?;
        let entry = queue.remove_at(index)?;

        self.set_status(entry.task_id, TaskStatus::InProgress);
        self.tasks.get(&entry.task_id).cloned()
    }

    /// Remove a task from its queue and return it to the pending pool.
    pub fn unschedule_task(&mut self, task_id: TaskId) -> CadreResult<()> {
        let task = self
            .tasks
            .get(&task_id)
            .ok_or(TaskError::NotFound { task_id })?;
        let agent_id = task.assigned_agent.ok_or(TaskError::NotQueued { task_id })?;
        let removed = self
            .queues
            .get_mut(&agent_id)
            .and_then(|q| q.remove(task_id));
        if removed.is_none() {
            return Err(TaskError::NotQueued { task_id }.into());
        }

        let from = task.status;
        if let Some(record) = self.tasks.get_mut(&task_id) {
            record.unassign();
        }
        if from != TaskStatus::Pending {
            self.bus.publish(CoordinationEvent::TaskStatusChanged {
                task_id,
                from,
                to: TaskStatus::Pending,
            });
        }
        Ok(())
    }

    /// Record a finished task and unblock anything waiting on it.
    pub fn finish_task(&mut self, task_id: TaskId, success: bool) -> CadreResult<()> {
        if !self.tasks.contains_key(&task_id) {
            return Err(TaskError::NotFound { task_id }.into());
        }
        self.set_status(
            task_id,
            if success {
                TaskStatus::Completed
            } else {
                TaskStatus::Failed
            },
        );

        if success {
            // Blocked dependents may now be schedulable.
            let completed = self.completed_set();
            let ready: Vec<TaskId> = self
                .graph
                .dependents_of(task_id)
                .into_iter()
                .filter(|d| {
                    self.graph.dependencies_met(*d, &completed)
                        && self.tasks.get(d).is_some_and(|t| t.status == TaskStatus::Blocked)
                })
                .collect();
            for dependent in ready {
                let _ = self.schedule_task(dependent)?;
            }
        }
        Ok(())
    }

    /// Re-place every unstarted task. Invoked whenever agent availability
    /// changes materially.
    pub fn rebalance(&mut self) {
        for queue in self.queues.values_mut() {
            for entry in queue.drain() {
                if let Some(task) = self.tasks.get_mut(&entry.task_id) {
                    task.unassign();
                }
            }
        }
        // Anything pending and unassigned is placeable again, including tasks
        // orphaned by an agent that just left.
        let mut pending: Vec<Task> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending && t.assigned_agent.is_none())
            .cloned()
            .collect();
        if pending.is_empty() {
            return;
        }

        self.strategy.prioritize(&mut pending);
        tracing::debug!(count = pending.len(), "rebalancing queues");
        for task in pending {
            // Placement failures leave the task pending for the next pass.
            let _ = self.schedule_task(task.task_id);
        }
    }

    /// Point an in-progress task's record at the agent now executing it
    /// (used when the assignment engine moves work off a failing agent).
    pub fn reassign_task_to(&mut self, task_id: TaskId, agent_id: AgentId) -> CadreResult<()> {
        let task = self
            .tasks
            .get_mut(&task_id)
            .ok_or(TaskError::NotFound { task_id })?;
        task.assign(agent_id);
        Ok(())
    }

    /// Queue length for an agent.
    pub fn queue_len(&self, agent_id: AgentId) -> usize {
        self.queues.get(&agent_id).map_or(0, |q| q.len())
    }

    fn set_status(&mut self, task_id: TaskId, to: TaskStatus) {
        let Some(task) = self.tasks.get_mut(&task_id) else {
            return;
        };
        let from = task.status;
        if from == to {
            return;
        }
        match to {
            TaskStatus::InProgress => task.start(),
            TaskStatus::Completed => task.complete(),
            TaskStatus::Failed => task.fail(),
            TaskStatus::Blocked => task.block(),
            TaskStatus::Pending => task.unassign(),
        }
        self.bus
            .publish(CoordinationEvent::TaskStatusChanged { task_id, from, to });
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cadre_core::TaskPriority;

    fn scheduler() -> TaskScheduler {
        TaskScheduler::new(SchedulerConfig::default(), EventBus::new(64))
    }

    fn agent(agent_type: &str) -> AgentInfo {
        AgentInfo::new(agent_type, vec![])
    }

    #[test]
    fn test_schedule_without_agents_declines() {
        let mut sched = scheduler();
        let task = Task::new("Ship it", "devops");
        let id = task.task_id;
        sched.add_task(task).unwrap();
        assert_eq!(sched.schedule_task(id).unwrap(), ScheduleOutcome::NoAgent);
    }

    #[test]
    fn test_blocked_when_dependencies_unmet() {
        let mut sched = scheduler();
        sched.register_agent(agent("backend")).unwrap();

        let dep = Task::new("Schema", "backend");
        let dep_id = dep.task_id;
        sched.add_task(dep).unwrap();

        let task = Task::new("Endpoints", "backend").with_dependencies(vec![dep_id]);
        let task_id = task.task_id;
        sched.add_task(task).unwrap();

        match sched.schedule_task(task_id).unwrap() {
            ScheduleOutcome::Blocked { missing } => assert_eq!(missing, vec![dep_id]),
            other => panic!("expected blocked, got {other:?}"),
        }
        assert_eq!(sched.task(task_id).unwrap().status, TaskStatus::Blocked);
    }

    #[test]
    fn test_schedule_assigns_and_estimates_start() {
        let mut sched = scheduler();
        let worker = agent("backend");
        let worker_id = worker.agent_id;
        sched.register_agent(worker).unwrap();

        let first = Task::new("A", "backend").with_estimated_duration(5_000);
        let first_id = first.task_id;
        sched.add_task(first).unwrap();
        sched.schedule_task(first_id).unwrap();

        let second = Task::new("B", "backend");
        let second_id = second.task_id;
        sched.add_task(second).unwrap();
        let before = Utc::now();
        match sched.schedule_task(second_id).unwrap() {
            ScheduleOutcome::Scheduled {
                agent_id,
                estimated_start,
            } => {
                assert_eq!(agent_id, worker_id);
                // One 5s entry sits ahead in the queue.
                assert!(estimated_start >= before + chrono::Duration::milliseconds(4_900));
            }
            other => panic!("expected scheduled, got {other:?}"),
        }
        assert_eq!(sched.queue_len(worker_id), 2);
    }

    #[test]
    fn test_next_task_returns_first_runnable_entry() {
        let mut sched = scheduler();
        let worker = agent("backend");
        let worker_id = worker.agent_id;
        sched.register_agent(worker).unwrap();

        let dep = Task::new("Dep", "backend");
        let dep_id = dep.task_id;
        sched.add_task(dep).unwrap();

        // The critical task is gated on `dep`, so placement marks it
        // blocked; only the independent low-priority task is dispatchable.
        let gated = Task::new("Gated", "backend")
            .with_priority(TaskPriority::Critical)
            .with_dependencies(vec![dep_id]);
        let gated_id = gated.task_id;
        sched.add_task(gated).unwrap();

        let free = Task::new("Free", "backend").with_priority(TaskPriority::Low);
        let free_id = free.task_id;
        sched.add_task(free).unwrap();

        sched.schedule_task(gated_id).unwrap();
        sched.schedule_task(free_id).unwrap();

        let next = sched.next_task_for(worker_id).unwrap();
        assert_eq!(next.task_id, free_id);
        assert_eq!(next.status, TaskStatus::InProgress);
    }

    #[test]
    fn test_never_dispatches_with_unmet_dependencies() {
        let mut sched = scheduler();
        let worker = agent("backend");
        let worker_id = worker.agent_id;
        sched.register_agent(worker).unwrap();

        let dep = Task::new("Dep", "backend");
        let dep_id = dep.task_id;
        sched.add_task(dep).unwrap();
        let gated = Task::new("Gated", "backend").with_dependencies(vec![dep_id]);
        let gated_id = gated.task_id;
        sched.add_task(gated).unwrap();
        sched.schedule_task(gated_id).unwrap();

        assert!(sched.next_task_for(worker_id).is_none());
    }

    #[test]
    fn test_finish_unblocks_dependents() {
        let mut sched = scheduler();
        let worker = agent("backend");
        let worker_id = worker.agent_id;
        sched.register_agent(worker).unwrap();

        let dep = Task::new("Dep", "backend");
        let dep_id = dep.task_id;
        sched.add_task(dep).unwrap();
        let gated = Task::new("Gated", "backend").with_dependencies(vec![dep_id]);
        let gated_id = gated.task_id;
        sched.add_task(gated).unwrap();

        assert!(matches!(
            sched.schedule_task(gated_id).unwrap(),
            ScheduleOutcome::Blocked { .. }
        ));

        sched.schedule_task(dep_id).unwrap();
        let started = sched.next_task_for(worker_id).unwrap();
        assert_eq!(started.task_id, dep_id);
        sched.finish_task(dep_id, true).unwrap();

        // The dependent was rescheduled and is now dispatchable.
        let next = sched.next_task_for(worker_id).unwrap();
        assert_eq!(next.task_id, gated_id);
    }

    #[test]
    fn test_unschedule_returns_task_to_pending() {
        let mut sched = scheduler();
        sched.register_agent(agent("docs")).unwrap();

        let task = Task::new("Guide", "docs");
        let task_id = task.task_id;
        sched.add_task(task).unwrap();
        sched.schedule_task(task_id).unwrap();

        sched.unschedule_task(task_id).unwrap();
        let task = sched.task(task_id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.assigned_agent.is_none());
        assert!(task.started_at.is_none());
    }

    #[test]
    fn test_unregister_requeues_onto_remaining_agent() {
        let mut sched = scheduler();
        let leaving = agent("backend");
        let leaving_id = leaving.agent_id;
        sched.register_agent(leaving).unwrap();

        let task = Task::new("Migrate", "backend");
        let task_id = task.task_id;
        sched.add_task(task).unwrap();
        sched.schedule_task(task_id).unwrap();

        let staying = agent("backend");
        let staying_id = staying.agent_id;
        sched.register_agent(staying).unwrap();

        sched.unregister_agent(leaving_id).unwrap();
        assert_eq!(sched.queue_len(staying_id), 1);
        assert_eq!(
            sched.task(task_id).unwrap().assigned_agent,
            Some(staying_id)
        );
    }

    #[test]
    fn test_cyclic_task_rejected_and_rolled_back() {
        let mut sched = scheduler();
        let a = Task::new("A", "backend");
        let a_id = a.task_id;
        sched.add_task(a).unwrap();

        let b = Task::new("B", "backend").with_dependencies(vec![a_id]);
        let b_id = b.task_id;
        sched.add_task(b).unwrap();

        // A task depending on both b and (transitively) itself is rejected.
        let mut bad = Task::new("Bad", "backend");
        bad.depends_on = vec![b_id, bad.task_id];
        assert!(sched.add_task(bad.clone()).is_err());
        assert!(sched.task(bad.task_id).is_none());
    }
}
