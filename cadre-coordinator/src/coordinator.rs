//! Coordination facade.
//!
//! Owns the agent registry and forwards task, workflow, file, and health
//! operations to the subsystems, sharing one event bus and one assignment
//! engine between the direct-task path and the workflow path.

use crate::background::{
    lock_sweep_task, reassignment_task, simple_sweep_task, BackgroundTasks,
};
use crate::registry::AgentRegistry;
use cadre_assignment::AssignmentEngine;
use cadre_core::{
    AgentId, AgentInfo, CadreConfig, CadreError, CadreResult, CollaborationSession,
    CoordinationError, CoordinationEvent, EventBus, EventReceiver, ExecutionId, ExecutionState,
    SessionId, Task, TaskId, WorkflowDefinition, WorkflowExecution, WorkflowId,
};
use cadre_files::{FileAccessCoordinator, FileIo};
use cadre_health::{AgentProbe, HealthMonitor, RecoveryHandler};
use cadre_scheduler::{ScheduleOutcome, TaskScheduler};
use cadre_workflow::{StepExecutor, WorkflowOrchestrator};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

/// Single entry point for the coordination core.
pub struct Coordinator {
    config: CadreConfig,
    bus: EventBus,
    registry: Arc<AgentRegistry>,
    scheduler: Arc<RwLock<TaskScheduler>>,
    engine: Arc<RwLock<AssignmentEngine>>,
    orchestrator: Arc<WorkflowOrchestrator>,
    files: Arc<FileAccessCoordinator>,
    monitor: HealthMonitor,
    sessions: RwLock<HashMap<SessionId, CollaborationSession>>,
    resources: RwLock<HashMap<String, AgentId>>,
}

impl Coordinator {
    /// Wire up the core around the caller-supplied boundary implementations.
    pub fn new(
        config: CadreConfig,
        io: Arc<dyn FileIo>,
        probe: Arc<dyn AgentProbe>,
        recovery: Arc<dyn RecoveryHandler>,
        executor: Arc<dyn StepExecutor>,
    ) -> CadreResult<Self> {
        config.validate()?;
        let bus = EventBus::new(config.coordinator.event_capacity);
        let registry = Arc::new(AgentRegistry::new());
        let scheduler = Arc::new(RwLock::new(TaskScheduler::new(
            config.scheduler.clone(),
            bus.clone(),
        )));
        let engine = Arc::new(RwLock::new(AssignmentEngine::new(
            config.assignment.clone(),
            bus.clone(),
        )));
        let orchestrator = Arc::new(WorkflowOrchestrator::new(
            engine.clone(),
            registry.clone(),
            executor,
            config.workflow.clone(),
            bus.clone(),
        ));
        let files = Arc::new(FileAccessCoordinator::new(
            io,
            config.files.clone(),
            bus.clone(),
        ));
        let monitor = HealthMonitor::new(probe, recovery, config.health.clone(), bus.clone());

        Ok(Self {
            config,
            bus,
            registry,
            scheduler,
            engine,
            orchestrator,
            files,
            monitor,
            sessions: RwLock::new(HashMap::new()),
            resources: RwLock::new(HashMap::new()),
        })
    }

    /// Subscribe to every coordination event.
    pub fn subscribe(&self) -> EventReceiver {
        self.bus.subscribe()
    }

    /// The file access coordinator.
    pub fn files(&self) -> &Arc<FileAccessCoordinator> {
        &self.files
    }

    /// The health monitor.
    pub fn monitor(&self) -> &HealthMonitor {
        &self.monitor
    }

    // ------------------------------------------------------------------
    // Agents
    // ------------------------------------------------------------------

    /// Register an agent everywhere: registry, scheduler pool, health watch.
    pub fn register_agent(&self, info: AgentInfo) -> CadreResult<()> {
        let agent_id = info.agent_id;
        let agent_type = info.agent_type.clone();
        self.registry.register(info.clone())?;
        self.scheduler_mut()?.register_agent(info)?;
        self.monitor.watch_agent(agent_id)?;
        tracing::info!(agent_id = %agent_id, agent_type, "agent registered");
        self.bus.publish(CoordinationEvent::AgentRegistered {
            agent_id,
            agent_type,
        });
        Ok(())
    }

    /// Remove an agent; its queued tasks are rebalanced onto the remaining
    /// pool.
    pub fn unregister_agent(&self, agent_id: AgentId) -> CadreResult<AgentInfo> {
        let info = self.registry.unregister(agent_id)?;
        self.scheduler_mut()?.unregister_agent(agent_id)?;
        self.monitor.unwatch_agent(agent_id)?;
        self.bus
            .publish(CoordinationEvent::AgentUnregistered { agent_id });
        Ok(info)
    }

    /// Refresh an agent's scheduling snapshot.
    pub fn update_agent(&self, info: AgentInfo) -> CadreResult<()> {
        self.registry.update(info.clone())?;
        self.scheduler_mut()?.update_agent(info)
    }

    /// Record an agent heartbeat on the registry and its live executions.
    pub fn agent_heartbeat(&self, agent_id: AgentId) -> CadreResult<()> {
        self.registry.heartbeat(agent_id)?;
        self.engine_mut()?.record_agent_heartbeat(agent_id);
        Ok(())
    }

    /// Registry snapshot of one agent.
    pub fn agent(&self, agent_id: AgentId) -> CadreResult<Option<AgentInfo>> {
        self.registry.get(agent_id)
    }

    /// Registry snapshots of all agents.
    pub fn agents(&self) -> CadreResult<Vec<AgentInfo>> {
        self.registry.all()
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    /// Add a task and attempt to place it.
    pub fn submit_task(&self, task: Task) -> CadreResult<ScheduleOutcome> {
        let task_id = task.task_id;
        let mut scheduler = self.scheduler_mut()?;
        scheduler.add_task(task)?;
        scheduler.schedule_task(task_id)
    }

    /// Dispatch the next runnable task for an agent, opening an execution
    /// record for monitoring.
    pub fn next_task_for(&self, agent_id: AgentId) -> CadreResult<Option<Task>> {
        let task = self.scheduler_mut()?.next_task_for(agent_id);
        if let Some(task) = &task {
            self.engine_mut()?.start_execution(task, agent_id);
            let _ = self.registry.adjust_task_count(agent_id, 1);
        }
        Ok(task)
    }

    /// Record a finished task: close the execution, fold performance, free
    /// the agent's slot, and unblock dependents.
    pub fn complete_task(
        &self,
        task_id: TaskId,
        success: bool,
        quality: f64,
    ) -> CadreResult<()> {
        let agent_id = {
            let mut engine = self.engine_mut()?;
            let agent_id = engine.execution(task_id).map(|e| e.agent_id);
            engine.complete_execution(task_id, success, quality)?;
            agent_id
        };
        if let Some(agent_id) = agent_id {
            let _ = self.registry.adjust_task_count(agent_id, -1);
        }
        self.scheduler_mut()?.finish_task(task_id, success)
    }

    /// Remove a task from its queue and return it to the pending pool.
    pub fn unschedule_task(&self, task_id: TaskId) -> CadreResult<()> {
        self.scheduler_mut()?.unschedule_task(task_id)
    }

    /// Snapshot of a task record.
    pub fn task(&self, task_id: TaskId) -> CadreResult<Option<Task>> {
        Ok(self.scheduler_ref()?.task(task_id).cloned())
    }

    // ------------------------------------------------------------------
    // Workflows
    // ------------------------------------------------------------------

    /// Register a workflow definition.
    pub fn register_workflow(&self, definition: WorkflowDefinition) -> CadreResult<WorkflowId> {
        self.orchestrator.register_workflow(definition)
    }

    /// Create and start an execution of a registered workflow.
    pub fn start_workflow(
        &self,
        workflow_id: WorkflowId,
        context: HashMap<String, serde_json::Value>,
    ) -> CadreResult<ExecutionId> {
        self.orchestrator.start_execution(workflow_id, context)
    }

    /// Drive a workflow execution to a terminal state.
    pub async fn run_workflow(&self, execution_id: ExecutionId) -> CadreResult<ExecutionState> {
        self.orchestrator.run(execution_id).await
    }

    /// Pause a running workflow execution.
    pub fn pause_workflow(&self, execution_id: ExecutionId) -> CadreResult<()> {
        self.orchestrator.pause_execution(execution_id)
    }

    /// Resume a paused workflow execution.
    pub fn resume_workflow(&self, execution_id: ExecutionId) -> CadreResult<()> {
        self.orchestrator.resume_execution(execution_id)
    }

    /// Cooperatively cancel a workflow execution.
    pub fn cancel_workflow(&self, execution_id: ExecutionId) -> CadreResult<()> {
        self.orchestrator.cancel_execution(execution_id)
    }

    /// Snapshot of a workflow execution.
    pub fn workflow_execution(&self, execution_id: ExecutionId) -> CadreResult<WorkflowExecution> {
        self.orchestrator.execution(execution_id)
    }

    // ------------------------------------------------------------------
    // Collaboration sessions
    // ------------------------------------------------------------------

    /// Start a named collaboration session.
    pub fn start_collaboration_session(
        &self,
        name: &str,
        participants: Vec<AgentId>,
        shared_files: Vec<String>,
    ) -> CadreResult<SessionId> {
        let session = CollaborationSession::start(name, participants, shared_files);
        let session_id = session.session_id;
        self.sessions_mut()?.insert(session_id, session);
        self.bus.publish(CoordinationEvent::SessionStarted {
            session_id,
            name: name.to_string(),
        });
        Ok(session_id)
    }

    /// Complete a session; the end timestamp lands strictly after the start.
    pub fn end_collaboration_session(
        &self,
        session_id: SessionId,
    ) -> CadreResult<CollaborationSession> {
        let session = {
            let mut sessions = self.sessions_mut()?;
            let session = sessions
                .get_mut(&session_id)
                .ok_or(CoordinationError::SessionNotFound { session_id })?;
            session.end();
            session.clone()
        };
        self.bus.publish(CoordinationEvent::SessionEnded {
            session_id,
            name: session.name.clone(),
        });
        Ok(session)
    }

    /// Snapshot of a session.
    pub fn session(&self, session_id: SessionId) -> CadreResult<Option<CollaborationSession>> {
        Ok(self.sessions_ref()?.get(&session_id).cloned())
    }

    // ------------------------------------------------------------------
    // Resource bookkeeping
    // ------------------------------------------------------------------

    /// Allocate a named resource to an agent.
    pub fn allocate_resource(&self, resource: &str, agent_id: AgentId) -> CadreResult<()> {
        let mut resources = self.resources_mut()?;
        if let Some(holder) = resources.get(resource) {
            if *holder != agent_id {
                return Err(CoordinationError::ResourceHeld {
                    resource: resource.to_string(),
                    holder: *holder,
                }
                .into());
            }
            return Ok(());
        }
        resources.insert(resource.to_string(), agent_id);
        drop(resources);
        self.bus.publish(CoordinationEvent::ResourceAllocated {
            resource: resource.to_string(),
            agent_id,
        });
        Ok(())
    }

    /// Release a named resource. Only the holder may release; releasing an
    /// unallocated resource is a no-op returning false.
    pub fn release_resource(&self, resource: &str, agent_id: AgentId) -> CadreResult<bool> {
        let released = {
            let mut resources = self.resources_mut()?;
            match resources.get(resource) {
                Some(holder) if *holder == agent_id => {
                    resources.remove(resource);
                    true
                }
                _ => false,
            }
        };
        if released {
            self.bus.publish(CoordinationEvent::ResourceReleased {
                resource: resource.to_string(),
                agent_id,
            });
        }
        Ok(released)
    }

    /// Current holder of a named resource.
    pub fn resource_holder(&self, resource: &str) -> CadreResult<Option<AgentId>> {
        Ok(self.resources_ref()?.get(resource).copied())
    }

    // ------------------------------------------------------------------
    // Background tasks
    // ------------------------------------------------------------------

    /// Spawn the periodic sweeps: lock expiry, reassignment detection, and
    /// the lightweight heartbeat sweep. Shutdown is cooperative.
    pub fn spawn_background_tasks(&self) -> BackgroundTasks {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let lock_handle = tokio::spawn({
            let files = self.files.clone();
            let interval = self.config.files.sweep_interval;
            let rx = shutdown_rx.clone();
            async move {
                let _ = lock_sweep_task(files, interval, rx).await;
            }
        });
        let reassign_handle = tokio::spawn({
            let scheduler = self.scheduler.clone();
            let engine = self.engine.clone();
            let registry = self.registry.clone();
            let tick = self.config.coordinator.reassignment_tick;
            let rx = shutdown_rx.clone();
            async move {
                let _ = reassignment_task(scheduler, engine, registry, tick, rx).await;
            }
        });
        let sweep_handle = tokio::spawn({
            let registry = self.registry.clone();
            let bus = self.bus.clone();
            let interval = self.config.coordinator.simple_sweep_interval;
            let stale_after = self.config.coordinator.heartbeat_stale_after;
            let rx = shutdown_rx;
            async move {
                let _ = simple_sweep_task(registry, bus, interval, stale_after, rx).await;
            }
        });

        BackgroundTasks::new(shutdown_tx, vec![lock_handle, reassign_handle, sweep_handle])
    }

    /// Stop the health monitor loops and drop finished workflow executions.
    pub fn shutdown(&self) -> CadreResult<usize> {
        self.monitor.shutdown();
        self.orchestrator.cleanup_finished()
    }

    // ------------------------------------------------------------------
    // Guards
    // ------------------------------------------------------------------

    fn scheduler_ref(&self) -> CadreResult<std::sync::RwLockReadGuard<'_, TaskScheduler>> {
        self.scheduler
            .read()
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))
    }

    fn scheduler_mut(&self) -> CadreResult<std::sync::RwLockWriteGuard<'_, TaskScheduler>> {
        self.scheduler
            .write()
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))
    }

    fn engine_mut(&self) -> CadreResult<std::sync::RwLockWriteGuard<'_, AssignmentEngine>> {
        self.engine
            .write()
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))
    }

    fn sessions_ref(
        &self,
    ) -> CadreResult<std::sync::RwLockReadGuard<'_, HashMap<SessionId, CollaborationSession>>>
    {
        self.sessions
            .read()
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))
    }

    fn sessions_mut(
        &self,
    ) -> CadreResult<std::sync::RwLockWriteGuard<'_, HashMap<SessionId, CollaborationSession>>>
    {
        self.sessions
            .write()
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))
    }

    fn resources_ref(
        &self,
    ) -> CadreResult<std::sync::RwLockReadGuard<'_, HashMap<String, AgentId>>> {
        self.resources
            .read()
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))
    }

    fn resources_mut(
        &self,
    ) -> CadreResult<std::sync::RwLockWriteGuard<'_, HashMap<String, AgentId>>> {
        self.resources
            .write()
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))
    }
}
