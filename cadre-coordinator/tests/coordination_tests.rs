//! End-to-end coordination tests across the facade.

use cadre_assignment::AssignmentEngine;
use cadre_coordinator::Coordinator;
use cadre_core::{
    AgentInfo, AssignmentConfig, CadreConfig, CoordinationEvent, EventBus, ExecutionState,
    LockKind, SessionStatus, Task, TaskPriority, TaskStatus, WorkflowDefinition, WorkflowStep,
};
use cadre_scheduler::{BalancedStrategy, ScheduleOutcome, SchedulingStrategy};
use cadre_test_utils::{
    agent_pool, arb_agent_info, arb_capabilities, arb_task, InMemoryFileIo, MockProbe,
    MockRecovery, MockStepExecutor,
};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn coordinator() -> Coordinator {
    coordinator_with(CadreConfig::default())
}

fn coordinator_with(config: CadreConfig) -> Coordinator {
    Coordinator::new(
        config,
        Arc::new(InMemoryFileIo::new()),
        Arc::new(MockProbe::healthy()),
        Arc::new(MockRecovery::accepting()),
        Arc::new(MockStepExecutor::succeeding()),
    )
    .expect("default config is valid")
}

// ============================================================================
// TASK LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_task_lifecycle_through_facade() {
    let coord = coordinator();
    let agent = AgentInfo::new("backend", vec!["rust".to_string()]);
    let agent_id = agent.agent_id;
    coord.register_agent(agent).unwrap();

    let schema = Task::new("Design schema", "backend");
    let schema_id = schema.task_id;
    let endpoints = Task::new("Build endpoints", "backend").with_dependencies(vec![schema_id]);
    let endpoints_id = endpoints.task_id;

    assert!(matches!(
        coord.submit_task(schema).unwrap(),
        ScheduleOutcome::Scheduled { .. }
    ));
    assert!(matches!(
        coord.submit_task(endpoints).unwrap(),
        ScheduleOutcome::Blocked { .. }
    ));

    // Dependent is never dispatched before its dependency completes.
    let first = coord.next_task_for(agent_id).unwrap().unwrap();
    assert_eq!(first.task_id, schema_id);
    assert!(coord.next_task_for(agent_id).unwrap().is_none());

    coord.complete_task(schema_id, true, 1.0).unwrap();
    assert_eq!(
        coord.task(schema_id).unwrap().unwrap().status,
        TaskStatus::Completed
    );

    let second = coord.next_task_for(agent_id).unwrap().unwrap();
    assert_eq!(second.task_id, endpoints_id);
    coord.complete_task(endpoints_id, true, 1.0).unwrap();

    let done = coord.task(endpoints_id).unwrap().unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert!(done.started_at.unwrap() <= done.completed_at.unwrap());
}

#[tokio::test]
async fn test_unschedule_returns_task_to_pending() {
    let coord = coordinator();
    let agent = AgentInfo::new("docs", vec![]);
    coord.register_agent(agent).unwrap();

    let task = Task::new("Write changelog", "docs");
    let task_id = task.task_id;
    coord.submit_task(task).unwrap();
    coord.unschedule_task(task_id).unwrap();

    let record = coord.task(task_id).unwrap().unwrap();
    assert_eq!(record.status, TaskStatus::Pending);
    assert!(record.assigned_agent.is_none());
    assert!(record.started_at.is_none());
    assert!(record.completed_at.is_none());
}

#[tokio::test]
async fn test_registration_events_published() {
    let coord = coordinator();
    let mut rx = coord.subscribe();

    let agent = AgentInfo::new("devops", vec![]);
    let agent_id = agent.agent_id;
    coord.register_agent(agent).unwrap();

    match rx.try_recv().unwrap() {
        CoordinationEvent::AgentRegistered {
            agent_id: got,
            agent_type,
        } => {
            assert_eq!(got, agent_id);
            assert_eq!(agent_type, "devops");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

// ============================================================================
// PRIORITIZATION
// ============================================================================

#[test]
fn test_critical_task_outranks_older_low_task() {
    let a = Task::new("A", "backend").with_priority(TaskPriority::Low);
    let b = Task::new("B", "backend").with_priority(TaskPriority::Critical);
    let mut tasks = vec![a.clone(), b.clone()];
    BalancedStrategy.prioritize(&mut tasks);
    assert_eq!(tasks[0].task_id, b.task_id);
    assert_eq!(tasks[1].task_id, a.task_id);
}

// ============================================================================
// COLLABORATION SESSIONS
// ============================================================================

#[tokio::test]
async fn test_session_round_trip() {
    let coord = coordinator();
    let agent = AgentInfo::new("frontend", vec![]);
    let agent_id = agent.agent_id;
    coord.register_agent(agent).unwrap();

    let session_id = coord
        .start_collaboration_session(
            "checkout-redesign",
            vec![agent_id],
            vec!["src/checkout.rs".to_string()],
        )
        .unwrap();
    let ended = coord.end_collaboration_session(session_id).unwrap();

    assert_eq!(ended.status, SessionStatus::Completed);
    assert!(ended.ended_at.unwrap() > ended.started_at);
}

// ============================================================================
// RESOURCES
// ============================================================================

#[tokio::test]
async fn test_resource_bookkeeping() {
    let coord = coordinator();
    let (a, b) = (uuid::Uuid::now_v7(), uuid::Uuid::now_v7());

    coord.allocate_resource("staging-db", a).unwrap();
    assert_eq!(coord.resource_holder("staging-db").unwrap(), Some(a));

    // Second agent cannot take a held resource.
    assert!(coord.allocate_resource("staging-db", b).is_err());
    // Non-holders cannot release it.
    assert!(!coord.release_resource("staging-db", b).unwrap());

    assert!(coord.release_resource("staging-db", a).unwrap());
    assert!(!coord.release_resource("staging-db", a).unwrap());
    assert_eq!(coord.resource_holder("staging-db").unwrap(), None);
}

// ============================================================================
// WORKFLOWS THROUGH THE FACADE
// ============================================================================

#[tokio::test]
async fn test_workflow_end_to_end() {
    let mut config = CadreConfig::default();
    config.workflow.step_recheck_interval = Duration::from_millis(1);
    config.workflow.retry_backoff_base = Duration::from_millis(1);
    let coord = coordinator_with(config);

    coord
        .register_agent(AgentInfo::new("backend", vec![]))
        .unwrap();
    coord
        .register_agent(AgentInfo::new("testing", vec![]))
        .unwrap();

    let definition = WorkflowDefinition::new(
        "feature-delivery",
        "implement then verify",
        vec![
            WorkflowStep::new("implement", "Implement", "code").with_agent_type("backend"),
            WorkflowStep::new("verify", "Verify", "test")
                .with_agent_type("testing")
                .with_dependencies(vec!["implement".to_string()]),
        ],
    );
    let workflow_id = coord.register_workflow(definition).unwrap();
    let execution_id = coord.start_workflow(workflow_id, HashMap::new()).unwrap();
    let state = coord.run_workflow(execution_id).await.unwrap();

    assert_eq!(state, ExecutionState::Completed);
    let execution = coord.workflow_execution(execution_id).unwrap();
    assert_eq!(execution.current_step, 2);
    assert!(execution.error.is_none());
}

#[tokio::test]
async fn test_cyclic_workflow_rejected() {
    let coord = coordinator();
    let definition = WorkflowDefinition::new(
        "loop",
        "",
        vec![
            WorkflowStep::new("a", "A", "x").with_dependencies(vec!["b".to_string()]),
            WorkflowStep::new("b", "B", "x").with_dependencies(vec!["a".to_string()]),
        ],
    );
    assert!(coord.register_workflow(definition).is_err());
}

// ============================================================================
// FILE COORDINATION THROUGH THE FACADE
// ============================================================================

#[tokio::test]
async fn test_locked_write_visible_to_readers() {
    let coord = coordinator();
    let agent = AgentInfo::new("backend", vec![]);
    let agent_id = agent.agent_id;
    coord.register_agent(agent).unwrap();

    let files = coord.files();
    let lock = files
        .request_lock("src/api.rs", agent_id, LockKind::Write)
        .unwrap();
    files.write("src/api.rs", agent_id, "pub fn api() {}").await.unwrap();
    files.release_lock(lock.lock_id).unwrap();

    files
        .request_lock("src/api.rs", agent_id, LockKind::Read)
        .unwrap();
    assert_eq!(
        files.read("src/api.rs", agent_id).await.unwrap(),
        "pub fn api() {}"
    );
}

// ============================================================================
// REASSIGNMENT UNDER AGENT FAILURE
// ============================================================================

#[tokio::test]
async fn test_silent_agent_loses_task_to_peer() {
    let mut config = CadreConfig::default();
    config.assignment.heartbeat_interval = Duration::from_millis(10);
    config.assignment.heartbeat_miss_threshold = 1;
    config.coordinator.reassignment_tick = Duration::from_millis(20);
    let coord = Arc::new(coordinator_with(config));

    let silent = AgentInfo::new("backend", vec![]);
    let silent_id = silent.agent_id;
    let healthy = AgentInfo::new("backend", vec![]);
    let healthy_id = healthy.agent_id;
    coord.register_agent(silent).unwrap();
    coord.register_agent(healthy).unwrap();

    let task = Task::new("Long migration", "backend").with_estimated_duration(60_000);
    let task_id = task.task_id;
    coord.submit_task(task).unwrap();

    // Dispatch lands on whichever agent the strategy queued it for.
    let mut dispatched = coord.next_task_for(silent_id).unwrap();
    if dispatched.is_none() {
        dispatched = coord.next_task_for(healthy_id).unwrap();
    }
    let executing = dispatched.unwrap().assigned_agent.unwrap();
    let other = if executing == silent_id {
        healthy_id
    } else {
        silent_id
    };

    let background = coord.spawn_background_tasks();
    // The peer keeps heartbeating; the executing agent goes silent.
    let heartbeater = tokio::spawn({
        let coord = coord.clone();
        async move {
            loop {
                let _ = coord.agent_heartbeat(other);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    heartbeater.abort();
    background.shutdown().await;

    let record = coord.task(task_id).unwrap().unwrap();
    assert_eq!(record.assigned_agent, Some(other));
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// An assigned agent always carries every capability the task requires.
    #[test]
    fn prop_assignment_respects_capabilities(
        task_caps in arb_capabilities(),
        agents in prop::collection::vec(arb_agent_info(), 1..6)
    ) {
        let engine = AssignmentEngine::new(AssignmentConfig::default(), EventBus::new(16));
        let task = Task::new("generated", "backend").with_capabilities(task_caps.clone());

        if let Some(result) = engine.assign_task(&task, &agents) {
            let chosen = agents.iter().find(|a| a.agent_id == result.agent_id).unwrap();
            for cap in &task_caps {
                prop_assert!(chosen.has_capability(cap));
            }
            prop_assert!(result.confidence >= 0.0 && result.confidence <= 1.0);
        }
    }

    /// Prioritization is deterministic: same inputs, same order.
    #[test]
    fn prop_prioritize_deterministic(tasks in prop::collection::vec(arb_task(), 0..12)) {
        let mut first = tasks.clone();
        let mut second = tasks;
        BalancedStrategy.prioritize(&mut first);
        BalancedStrategy.prioritize(&mut second);
        let a: Vec<_> = first.iter().map(|t| t.task_id).collect();
        let b: Vec<_> = second.iter().map(|t| t.task_id).collect();
        prop_assert_eq!(a, b);
    }

    /// Priority order is respected pairwise after prioritization.
    #[test]
    fn prop_prioritize_orders_by_weight(tasks in prop::collection::vec(arb_task(), 0..12)) {
        let mut ordered = tasks;
        BalancedStrategy.prioritize(&mut ordered);
        for pair in ordered.windows(2) {
            prop_assert!(pair[0].priority.weight() >= pair[1].priority.weight());
        }
    }

    /// The default strategy never selects an unknown agent id.
    #[test]
    fn prop_strategy_selects_from_pool(task in arb_task()) {
        let pool = agent_pool();
        let ids: Vec<_> = pool.iter().map(|a| a.agent_id).collect();
        let map: HashMap<_, _> = pool.into_iter().map(|a| (a.agent_id, a)).collect();
        if let Some(chosen) = BalancedStrategy.select_agent(&task, &ids, &map) {
            prop_assert!(ids.contains(&chosen));
        }
    }
}
