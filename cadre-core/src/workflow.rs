//! Workflow definitions and execution records.
//!
//! A workflow is a declarative list of steps with dependency edges between
//! them. One `WorkflowExecution` exists per invocation of a registered
//! definition; its ordered log is the primary audit surface since nothing is
//! persisted externally.

use crate::{ExecutionId, Timestamp, WorkflowId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ============================================================================
// DEFINITIONS
// ============================================================================

/// One step of a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Step identifier, unique within the workflow
    pub step_id: String,
    /// Human-readable name
    pub name: String,
    /// Agent type required to run this step (`None` = any agent)
    pub agent_type: Option<String>,
    /// Action identifier handed to the step executor
    pub action: String,
    /// Free-form parameters for the action
    pub parameters: serde_json::Value,
    /// Step ids that must complete before this step becomes ready
    pub depends_on: Vec<String>,
    /// Whether the workflow survives this step failing
    pub optional: bool,
    /// Retry budget before the step is marked failed
    pub max_retries: u32,
}

impl WorkflowStep {
    /// Create a step with no dependencies and the default retry budget.
    pub fn new(step_id: &str, name: &str, action: &str) -> Self {
        Self {
            step_id: step_id.to_string(),
            name: name.to_string(),
            agent_type: None,
            action: action.to_string(),
            parameters: serde_json::Value::Null,
            depends_on: Vec::new(),
            optional: false,
            max_retries: 3,
        }
    }

    /// Require a specific agent type.
    pub fn with_agent_type(mut self, agent_type: &str) -> Self {
        self.agent_type = Some(agent_type.to_string());
        self
    }

    /// Set action parameters.
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Declare step dependencies.
    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.depends_on = deps;
        self
    }

    /// Mark this step optional (failure skips rather than fails).
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Override the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// A registered multi-step, multi-agent plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique identifier for this definition
    pub workflow_id: WorkflowId,
    /// Workflow name
    pub name: String,
    /// What the workflow accomplishes
    pub description: String,
    /// Ordered step list (execution order is dependency-driven, not positional)
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowDefinition {
    /// Create a definition from its steps.
    pub fn new(name: &str, description: &str, steps: Vec<WorkflowStep>) -> Self {
        Self {
            workflow_id: Uuid::now_v7(),
            name: name.to_string(),
            description: description.to_string(),
            steps,
        }
    }

    /// Look up a step by id.
    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }
}

// ============================================================================
// EXECUTION STATE
// ============================================================================

/// Lifecycle state of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionState {
    /// The explicit transition table. `Paused ⇄ Running` is the only
    /// bidirectional pair; every other edge is one-way.
    pub const fn allows(self, to: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, to),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Paused, Running)
                | (Paused, Cancelled)
        )
    }

    /// Whether this state ends the execution.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::Completed | ExecutionState::Failed | ExecutionState::Cancelled
        )
    }
}

/// Lifecycle state of a single step within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Dependencies not yet satisfied
    Waiting,
    /// Dependencies satisfied, not yet dispatched
    Ready,
    /// An agent is executing it
    Running,
    Completed,
    Failed,
    /// Failed but marked optional, so the workflow moved on
    Skipped,
}

impl StepState {
    /// Whether this state ends the step.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            StepState::Completed | StepState::Failed | StepState::Skipped
        )
    }
}

/// Outcome returned by a step executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Whether the action succeeded
    pub success: bool,
    /// Output value merged into the execution context on success
    pub output: serde_json::Value,
    /// Error message on failure
    pub error: Option<String>,
}

impl StepOutcome {
    /// Successful outcome with an output value.
    pub fn ok(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    /// Failed outcome with an error message.
    pub fn err(error: &str) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error.to_string()),
        }
    }
}

// ============================================================================
// EXECUTION LOG
// ============================================================================

/// Severity of an execution log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One entry in the execution-scoped audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    /// When the event happened
    pub at: Timestamp,
    /// Step the entry concerns, if any
    pub step_id: Option<String>,
    /// Severity
    pub level: LogLevel,
    /// What happened
    pub message: String,
}

// ============================================================================
// EXECUTION
// ============================================================================

/// One invocation of a registered workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// Unique identifier for this execution
    pub execution_id: ExecutionId,
    /// Definition being executed
    pub workflow_id: WorkflowId,
    /// Current lifecycle state
    pub state: ExecutionState,
    /// Count of steps that have reached a terminal state (progress cursor)
    pub current_step: usize,
    /// Per-step states keyed by step id
    pub step_states: HashMap<String, StepState>,
    /// Per-step retry counters
    pub retry_counts: HashMap<String, u32>,
    /// Free-form context bag shared across steps
    pub context: HashMap<String, serde_json::Value>,
    /// Ordered execution log
    pub log: Vec<ExecutionLogEntry>,
    /// Terminal error, when the execution failed
    pub error: Option<String>,
    /// When the execution was created
    pub started_at: Timestamp,
    /// When the execution reached a terminal state
    pub finished_at: Option<Timestamp>,
}

impl WorkflowExecution {
    /// Create a pending execution of `definition` with every step waiting.
    pub fn for_definition(
        definition: &WorkflowDefinition,
        context: HashMap<String, serde_json::Value>,
    ) -> Self {
        let step_states = definition
            .steps
            .iter()
            .map(|s| (s.step_id.clone(), StepState::Waiting))
            .collect();
        Self {
            execution_id: Uuid::now_v7(),
            workflow_id: definition.workflow_id,
            state: ExecutionState::Pending,
            current_step: 0,
            step_states,
            retry_counts: HashMap::new(),
            context,
            log: Vec::new(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Append an entry to the execution log.
    pub fn log_event(&mut self, step_id: Option<&str>, level: LogLevel, message: &str) {
        self.log.push(ExecutionLogEntry {
            at: Utc::now(),
            step_id: step_id.map(|s| s.to_string()),
            level,
            message: message.to_string(),
        });
    }

    /// Current state of a step (`Waiting` for unknown ids).
    pub fn step_state(&self, step_id: &str) -> StepState {
        self.step_states
            .get(step_id)
            .copied()
            .unwrap_or(StepState::Waiting)
    }

    /// Set a step's state and bump the progress cursor on terminal states.
    pub fn set_step_state(&mut self, step_id: &str, state: StepState) {
        let prev = self.step_state(step_id);
        self.step_states.insert(step_id.to_string(), state);
        if state.is_terminal() && !prev.is_terminal() {
            self.current_step += 1;
        }
    }

    /// Retry count for a step.
    pub fn retries_of(&self, step_id: &str) -> u32 {
        self.retry_counts.get(step_id).copied().unwrap_or(0)
    }

    /// Increment and return a step's retry count.
    pub fn bump_retries(&mut self, step_id: &str) -> u32 {
        let count = self.retry_counts.entry(step_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use ExecutionState::*;
        assert!(Pending.allows(Running));
        assert!(Running.allows(Paused));
        assert!(Paused.allows(Running));
        assert!(Running.allows(Completed));

        // One-way edges stay one-way.
        assert!(!Completed.allows(Running));
        assert!(!Paused.allows(Completed));
        assert!(!Failed.allows(Running));
        assert!(!Cancelled.allows(Pending));
        assert!(!Pending.allows(Completed));
    }

    #[test]
    fn test_execution_starts_with_waiting_steps() {
        let def = WorkflowDefinition::new(
            "release",
            "build, test, publish",
            vec![
                WorkflowStep::new("build", "Build", "compile"),
                WorkflowStep::new("test", "Test", "run_tests")
                    .with_dependencies(vec!["build".to_string()]),
            ],
        );
        let exec = WorkflowExecution::for_definition(&def, HashMap::new());
        assert_eq!(exec.state, ExecutionState::Pending);
        assert_eq!(exec.step_state("build"), StepState::Waiting);
        assert_eq!(exec.step_state("test"), StepState::Waiting);
    }

    #[test]
    fn test_progress_cursor_counts_terminal_steps() {
        let def = WorkflowDefinition::new(
            "docs",
            "",
            vec![
                WorkflowStep::new("draft", "Draft", "write"),
                WorkflowStep::new("review", "Review", "review"),
            ],
        );
        let mut exec = WorkflowExecution::for_definition(&def, HashMap::new());
        exec.set_step_state("draft", StepState::Running);
        assert_eq!(exec.current_step, 0);
        exec.set_step_state("draft", StepState::Completed);
        assert_eq!(exec.current_step, 1);
        // Re-setting a terminal state does not double count.
        exec.set_step_state("draft", StepState::Completed);
        assert_eq!(exec.current_step, 1);
    }

    #[test]
    fn test_retry_counter() {
        let def = WorkflowDefinition::new(
            "ci",
            "",
            vec![WorkflowStep::new("lint", "Lint", "lint")],
        );
        let mut exec = WorkflowExecution::for_definition(&def, HashMap::new());
        assert_eq!(exec.retries_of("lint"), 0);
        assert_eq!(exec.bump_retries("lint"), 1);
        assert_eq!(exec.bump_retries("lint"), 2);
    }
}
