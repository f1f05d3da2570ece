//! Workflow orchestrator.
//!
//! One execution record per invocation of a registered definition. The
//! lifecycle state machine is driven through a single `transition` choke
//! point that consults the explicit transition table; step readiness is
//! dependency-driven; failed steps retry with linear backoff before failing
//! the execution (or being skipped, when the definition marks them optional).

use crate::validate::validate_definition;
use cadre_assignment::AssignmentEngine;
use cadre_core::{
    AgentId, AgentInfo, CadreError, CadreResult, CoordinationError, CoordinationEvent, EventBus,
    ExecutionId, ExecutionState, LogLevel, StepOutcome, StepState, Task, WorkflowConfig,
    WorkflowDefinition, WorkflowError, WorkflowExecution, WorkflowId, WorkflowStep,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

// ============================================================================
// BOUNDARY TRAITS
// ============================================================================

/// Supplies candidate agents, optionally filtered by type.
pub trait AgentProvider: Send + Sync {
    fn list_agents(&self, agent_type: Option<&str>) -> Vec<AgentInfo>;
}

/// Performs a step's action on an agent. Concrete per-specialization agent
/// logic lives outside the coordination core.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, step: &WorkflowStep, agent_id: AgentId) -> StepOutcome;
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// State machine executing declarative multi-step, multi-agent workflows.
pub struct WorkflowOrchestrator {
    definitions: RwLock<HashMap<WorkflowId, WorkflowDefinition>>,
    executions: RwLock<HashMap<ExecutionId, WorkflowExecution>>,
    engine: Arc<RwLock<AssignmentEngine>>,
    agents: Arc<dyn AgentProvider>,
    executor: Arc<dyn StepExecutor>,
    config: WorkflowConfig,
    bus: EventBus,
}

impl WorkflowOrchestrator {
    /// Create an orchestrator wired to the shared assignment engine.
    pub fn new(
        engine: Arc<RwLock<AssignmentEngine>>,
        agents: Arc<dyn AgentProvider>,
        executor: Arc<dyn StepExecutor>,
        config: WorkflowConfig,
        bus: EventBus,
    ) -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
            executions: RwLock::new(HashMap::new()),
            engine,
            agents,
            executor,
            config,
            bus,
        }
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Validate and register a workflow definition. Cyclic or dangling step
    /// dependencies are rejected here, not at run time.
    pub fn register_workflow(&self, definition: WorkflowDefinition) -> CadreResult<WorkflowId> {
        validate_definition(&definition)?;
        let id = definition.workflow_id;
        self.definitions_mut()?.insert(id, definition);
        Ok(id)
    }

    /// Snapshot of a registered definition.
    pub fn definition(&self, workflow_id: WorkflowId) -> CadreResult<WorkflowDefinition> {
        self.definitions_ref()?
            .get(&workflow_id)
            .cloned()
            .ok_or_else(|| WorkflowError::DefinitionNotFound { workflow_id }.into())
    }

    // ------------------------------------------------------------------
    // Execution lifecycle
    // ------------------------------------------------------------------

    /// Create an execution of a registered workflow and move it to running.
    pub fn start_execution(
        &self,
        workflow_id: WorkflowId,
        context: HashMap<String, serde_json::Value>,
    ) -> CadreResult<ExecutionId> {
        let definition = self.definition(workflow_id)?;
        let mut execution = WorkflowExecution::for_definition(&definition, context);
        execution.log_event(None, LogLevel::Info, "execution created");
        let execution_id = execution.execution_id;
        self.executions_mut()?.insert(execution_id, execution);
        self.transition(execution_id, ExecutionState::Running)?;
        Ok(execution_id)
    }

    /// Snapshot of an execution record.
    pub fn execution(&self, execution_id: ExecutionId) -> CadreResult<WorkflowExecution> {
        self.executions_ref()?
            .get(&execution_id)
            .cloned()
            .ok_or_else(|| WorkflowError::ExecutionNotFound { execution_id }.into())
    }

    /// Pause a running execution.
    pub fn pause_execution(&self, execution_id: ExecutionId) -> CadreResult<()> {
        self.transition(execution_id, ExecutionState::Paused)
    }

    /// Resume a paused execution.
    pub fn resume_execution(&self, execution_id: ExecutionId) -> CadreResult<()> {
        self.transition(execution_id, ExecutionState::Running)
    }

    /// Cooperatively cancel an execution: new steps stop being dispatched,
    /// in-flight work finishes naturally.
    pub fn cancel_execution(&self, execution_id: ExecutionId) -> CadreResult<()> {
        self.transition(execution_id, ExecutionState::Cancelled)
    }

    /// Drop every terminal execution record. Used at shutdown; executions are
    /// never auto-pruned.
    pub fn cleanup_finished(&self) -> CadreResult<usize> {
        let mut executions = self.executions_mut()?;
        let before = executions.len();
        executions.retain(|_, e| !e.state.is_terminal());
        Ok(before - executions.len())
    }

    /// Apply a lifecycle transition, consulting the transition table.
    pub fn transition(&self, execution_id: ExecutionId, to: ExecutionState) -> CadreResult<()> {
        let mut executions = self.executions_mut()?;
        let execution = executions
            .get_mut(&execution_id)
            .ok_or(WorkflowError::ExecutionNotFound { execution_id })?;
        let from = execution.state;
        if !from.allows(to) {
            return Err(WorkflowError::IllegalTransition {
                execution_id,
                from,
                to,
            }
            .into());
        }
        execution.state = to;
        if to.is_terminal() {
            execution.finished_at = Some(Utc::now());
        }
        execution.log_event(None, LogLevel::Info, &format!("{from:?} -> {to:?}"));
        tracing::debug!(execution_id = %execution_id, ?from, ?to, "workflow transition");
        self.bus.publish(CoordinationEvent::WorkflowStateChanged {
            execution_id,
            from,
            to,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Driving
    // ------------------------------------------------------------------

    /// Drive an execution to a terminal state. Steps with no dependency
    /// relation run in definition order; when no agent is available the
    /// pending step stays waiting and the driver sleeps the configured
    /// recheck interval rather than busy-polling.
    pub async fn run(&self, execution_id: ExecutionId) -> CadreResult<ExecutionState> {
        loop {
            let state = self.state_of(execution_id)?;
            match state {
                s if s.is_terminal() => return Ok(s),
                ExecutionState::Paused => {
                    tokio::time::sleep(self.config.step_recheck_interval).await;
                }
                ExecutionState::Pending => {
                    self.transition(execution_id, ExecutionState::Running)?;
                }
                ExecutionState::Running => match self.claim_ready_step(execution_id)? {
                    Some(step) => {
                        let progressed = self.execute_step(execution_id, &step).await?;
                        if !progressed {
                            tokio::time::sleep(self.config.step_recheck_interval).await;
                        }
                    }
                    None => {
                        if self.all_steps_terminal(execution_id)? {
                            self.transition(execution_id, ExecutionState::Completed)?;
                            return Ok(ExecutionState::Completed);
                        }
                        tokio::time::sleep(self.config.step_recheck_interval).await;
                    }
                },
                // is_terminal() covered above; nothing else remains.
                _ => unreachable!("covered by terminal arm"),
            }
        }
    }

    /// Find the first waiting step whose dependencies are all completed and
    /// mark it ready.
    fn claim_ready_step(&self, execution_id: ExecutionId) -> CadreResult<Option<WorkflowStep>> {
        let definitions = self.definitions_ref()?;
        let mut executions = self.executions_mut()?;
        let execution = executions
            .get_mut(&execution_id)
            .ok_or(WorkflowError::ExecutionNotFound { execution_id })?;
        let definition = definitions
            .get(&execution.workflow_id)
            .ok_or(WorkflowError::DefinitionNotFound {
                workflow_id: execution.workflow_id,
            })?;

        for step in &definition.steps {
            if execution.step_state(&step.step_id) != StepState::Waiting {
                continue;
            }
            let deps_done = step
                .depends_on
                .iter()
                .all(|d| execution.step_state(d) == StepState::Completed);
            if deps_done {
                execution.set_step_state(&step.step_id, StepState::Ready);
                self.bus.publish(CoordinationEvent::StepStateChanged {
                    execution_id,
                    step_id: step.step_id.clone(),
                    state: StepState::Ready,
                });
                return Ok(Some(step.clone()));
            }
        }
        Ok(None)
    }

    /// Execute one ready step. Returns false when no agent was available and
    /// the step went back to waiting.
    async fn execute_step(
        &self,
        execution_id: ExecutionId,
        step: &WorkflowStep,
    ) -> CadreResult<bool> {
        let Some(agent_id) = self.find_agent_for_step(step)? else {
            self.set_step(execution_id, step, StepState::Waiting)?;
            self.log_step(
                execution_id,
                step,
                LogLevel::Warn,
                "no agent available, will re-check",
            )?;
            return Ok(false);
        };

        self.set_step(execution_id, step, StepState::Running)?;
        self.log_step(
            execution_id,
            step,
            LogLevel::Info,
            &format!("dispatched to agent {agent_id}"),
        )?;

        let outcome = self.executor.execute(step, agent_id).await;
        if outcome.success {
            {
                let mut executions = self.executions_mut()?;
                if let Some(execution) = executions.get_mut(&execution_id) {
                    execution
                        .context
                        .insert(step.step_id.clone(), outcome.output.clone());
                }
            }
            self.set_step(execution_id, step, StepState::Completed)?;
            self.log_step(execution_id, step, LogLevel::Info, "step completed")?;
            return Ok(true);
        }

        let error = outcome.error.unwrap_or_else(|| "step failed".to_string());
        if self.should_retry_step(execution_id, step)? {
            let attempt = {
                let mut executions = self.executions_mut()?;
                let execution = executions
                    .get_mut(&execution_id)
                    .ok_or(WorkflowError::ExecutionNotFound { execution_id })?;
                execution.bump_retries(&step.step_id)
            };
            self.log_step(
                execution_id,
                step,
                LogLevel::Warn,
                &format!("attempt {attempt} failed: {error}; retrying"),
            )?;
            // Linear backoff: attempt x base delay.
            tokio::time::sleep(self.config.retry_backoff_base * attempt).await;
            self.set_step(execution_id, step, StepState::Waiting)?;
            return Ok(true);
        }

        if step.optional {
            self.log_step(
                execution_id,
                step,
                LogLevel::Warn,
                &format!("optional step failed permanently: {error}; skipping"),
            )?;
            self.skip_step_and_dependents(execution_id, &step.step_id)?;
            return Ok(true);
        }

        self.set_step(execution_id, step, StepState::Failed)?;
        self.log_step(
            execution_id,
            step,
            LogLevel::Error,
            &format!("step failed permanently: {error}"),
        )?;
        {
            let mut executions = self.executions_mut()?;
            if let Some(execution) = executions.get_mut(&execution_id) {
                execution.error = Some(error);
            }
        }
        self.transition(execution_id, ExecutionState::Failed)?;
        Ok(true)
    }

    /// Same assignment path as direct task placement, filtered by the step's
    /// required agent type.
    fn find_agent_for_step(&self, step: &WorkflowStep) -> CadreResult<Option<AgentId>> {
        let candidates = self.agents.list_agents(step.agent_type.as_deref());
        if candidates.is_empty() {
            return Ok(None);
        }
        let probe = Task::new(
            &step.name,
            step.agent_type.as_deref().unwrap_or("general"),
        );
        let engine = self
            .engine
            .read()
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))?;
        Ok(engine.assign_task(&probe, &candidates).map(|r| r.agent_id))
    }

    /// Whether a failed step still has retry budget.
    fn should_retry_step(&self, execution_id: ExecutionId, step: &WorkflowStep) -> CadreResult<bool> {
        let executions = self.executions_ref()?;
        let execution = executions
            .get(&execution_id)
            .ok_or(WorkflowError::ExecutionNotFound { execution_id })?;
        Ok(execution.retries_of(&step.step_id) < step.max_retries)
    }

    /// Mark a step skipped and cascade to every step that (transitively)
    /// depends on it: their inputs will never materialize.
    fn skip_step_and_dependents(
        &self,
        execution_id: ExecutionId,
        step_id: &str,
    ) -> CadreResult<()> {
        let definitions = self.definitions_ref()?;
        let mut executions = self.executions_mut()?;
        let execution = executions
            .get_mut(&execution_id)
            .ok_or(WorkflowError::ExecutionNotFound { execution_id })?;
        let definition = definitions
            .get(&execution.workflow_id)
            .ok_or(WorkflowError::DefinitionNotFound {
                workflow_id: execution.workflow_id,
            })?;

        let mut to_skip = vec![step_id.to_string()];
        while let Some(current) = to_skip.pop() {
            if !execution.step_state(&current).is_terminal() {
                execution.set_step_state(&current, StepState::Skipped);
                self.bus.publish(CoordinationEvent::StepStateChanged {
                    execution_id,
                    step_id: current.clone(),
                    state: StepState::Skipped,
                });
            }
            for step in &definition.steps {
                if step.depends_on.iter().any(|d| *d == current)
                    && !execution.step_state(&step.step_id).is_terminal()
                {
                    to_skip.push(step.step_id.clone());
                }
            }
        }
        Ok(())
    }

    fn all_steps_terminal(&self, execution_id: ExecutionId) -> CadreResult<bool> {
        let definitions = self.definitions_ref()?;
        let executions = self.executions_ref()?;
        let execution = executions
            .get(&execution_id)
            .ok_or(WorkflowError::ExecutionNotFound { execution_id })?;
        let definition = definitions
            .get(&execution.workflow_id)
            .ok_or(WorkflowError::DefinitionNotFound {
                workflow_id: execution.workflow_id,
            })?;
        Ok(definition
            .steps
            .iter()
            .all(|s| execution.step_state(&s.step_id).is_terminal()))
    }

    fn state_of(&self, execution_id: ExecutionId) -> CadreResult<ExecutionState> {
        self.executions_ref()?
            .get(&execution_id)
            .map(|e| e.state)
            .ok_or_else(|| WorkflowError::ExecutionNotFound { execution_id }.into())
    }

    fn set_step(
        &self,
        execution_id: ExecutionId,
        step: &WorkflowStep,
        state: StepState,
    ) -> CadreResult<()> {
        let mut executions = self.executions_mut()?;
        let execution = executions
            .get_mut(&execution_id)
            .ok_or(WorkflowError::ExecutionNotFound { execution_id })?;
        execution.set_step_state(&step.step_id, state);
        self.bus.publish(CoordinationEvent::StepStateChanged {
            execution_id,
            step_id: step.step_id.clone(),
            state,
        });
        Ok(())
    }

    fn log_step(
        &self,
        execution_id: ExecutionId,
        step: &WorkflowStep,
        level: LogLevel,
        message: &str,
    ) -> CadreResult<()> {
        let mut executions = self.executions_mut()?;
        let execution = executions
            .get_mut(&execution_id)
            .ok_or(WorkflowError::ExecutionNotFound { execution_id })?;
        execution.log_event(Some(&step.step_id), level, message);
        Ok(())
    }

    fn definitions_ref(
        &self,
    ) -> CadreResult<RwLockReadGuard<'_, HashMap<WorkflowId, WorkflowDefinition>>> {
        self.definitions
            .read()
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))
    }

    fn definitions_mut(
        &self,
    ) -> CadreResult<RwLockWriteGuard<'_, HashMap<WorkflowId, WorkflowDefinition>>> {
        self.definitions
            .write()
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))
    }

    fn executions_ref(
        &self,
    ) -> CadreResult<RwLockReadGuard<'_, HashMap<ExecutionId, WorkflowExecution>>> {
        self.executions
            .read()
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))
    }

    fn executions_mut(
        &self,
    ) -> CadreResult<RwLockWriteGuard<'_, HashMap<ExecutionId, WorkflowExecution>>> {
        self.executions
            .write()
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))
    }
}

// ============================================================================
// TESTS
// ============================================================================
