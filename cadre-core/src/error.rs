//! Error types for CADRE operations

use crate::{AgentId, ConflictId, ExecutionId, LockId, SessionId, TaskId, WorkflowId};
use crate::workflow::ExecutionState;
use thiserror::Error;

/// Task lifecycle errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task not found: {task_id}")]
    NotFound { task_id: TaskId },

    #[error("Task {task_id} is already assigned to {agent_id}")]
    AlreadyAssigned { task_id: TaskId, agent_id: AgentId },

    #[error("Task {task_id} is not queued")]
    NotQueued { task_id: TaskId },
}

/// Scheduling errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("No agents registered")]
    NoAgentsRegistered,

    #[error("Agent not known to the scheduler: {agent_id}")]
    AgentNotKnown { agent_id: AgentId },
}

/// Workflow orchestration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Workflow definition not found: {workflow_id}")]
    DefinitionNotFound { workflow_id: WorkflowId },

    #[error("Workflow execution not found: {execution_id}")]
    ExecutionNotFound { execution_id: ExecutionId },

    #[error("Illegal transition {from:?} -> {to:?} for execution {execution_id}")]
    IllegalTransition {
        execution_id: ExecutionId,
        from: ExecutionState,
        to: ExecutionState,
    },

    #[error("Step not found in workflow: {step_id}")]
    StepNotFound { step_id: String },
}

/// File coordination errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FileError {
    #[error("Lock rejected on {path}: held by {holder}")]
    LockRejected { path: String, holder: AgentId },

    #[error("Lock not found: {lock_id}")]
    LockNotFound { lock_id: LockId },

    #[error("Agent {agent_id} holds no {required} lock on {path}")]
    LockNotHeld {
        path: String,
        agent_id: AgentId,
        required: String,
    },

    #[error("Conflict not found: {conflict_id}")]
    ConflictNotFound { conflict_id: ConflictId },

    #[error("File backend error on {path}: {reason}")]
    Backend { path: String, reason: String },
}

/// Health monitoring errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HealthError {
    #[error("Agent is not monitored: {agent_id}")]
    NotMonitored { agent_id: AgentId },

    #[error("Recovery handler failed for {agent_id}: {reason}")]
    RecoveryHandlerFailed { agent_id: AgentId, reason: String },
}

/// Agent registry errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("Agent not registered: {agent_id}")]
    NotRegistered { agent_id: AgentId },

    #[error("Agent already registered: {agent_id}")]
    AlreadyRegistered { agent_id: AgentId },
}

/// Validation errors, rejected synchronously at the boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Task cannot depend on itself: {task_id}")]
    SelfDependency { task_id: TaskId },

    #[error("Dependency {dep} -> {task} would create a cycle")]
    CircularDependency { task: TaskId, dep: TaskId },

    #[error("Workflow step dependencies form a cycle through: {step_ids:?}")]
    CircularStepDependency { step_ids: Vec<String> },

    #[error("Step {step_id} depends on unknown step {depends_on}")]
    UnknownStepDependency { step_id: String, depends_on: String },

    #[error("Duplicate step id: {step_id}")]
    DuplicateStepId { step_id: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Facade-level coordination errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinationError {
    #[error("Interior lock poisoned")]
    LockPoisoned,

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: SessionId },

    #[error("Resource {resource} is held by {holder}")]
    ResourceHeld { resource: String, holder: AgentId },
}

/// Master error type for all CADRE errors.
#[derive(Debug, Clone, Error)]
pub enum CadreError {
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Scheduling error: {0}")]
    Scheduling(#[from] SchedulingError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Health error: {0}")]
    Health(#[from] HealthError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Coordination error: {0}")]
    Coordination(#[from] CoordinationError),
}

/// Result type alias for CADRE operations.
pub type CadreResult<T> = Result<T, CadreError>;

/// How bad an error is, for event consumers triaging failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl CadreError {
    /// Severity of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // Lock rejections are ordinary contention; callers retry.
            CadreError::File(FileError::LockRejected { .. }) => ErrorSeverity::Low,
            CadreError::Validation(_) | CadreError::Config(_) => ErrorSeverity::Medium,
            CadreError::Task(_) | CadreError::Scheduling(_) | CadreError::Agent(_) => {
                ErrorSeverity::Medium
            }
            CadreError::File(_) | CadreError::Workflow(_) => ErrorSeverity::High,
            CadreError::Health(_) => ErrorSeverity::High,
            CadreError::Coordination(CoordinationError::LockPoisoned) => ErrorSeverity::Critical,
            CadreError::Coordination(_) => ErrorSeverity::Medium,
        }
    }

    /// Whether retrying or otherwise continuing makes sense for this error.
    /// Malformed input and poisoned interior state do not recover.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            CadreError::Validation(_)
                | CadreError::Config(_)
                | CadreError::Coordination(CoordinationError::LockPoisoned)
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_task_error_display() {
        let err = TaskError::NotFound {
            task_id: Uuid::nil(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Task not found"));
        assert!(msg.contains("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn test_illegal_transition_display() {
        let err = WorkflowError::IllegalTransition {
            execution_id: Uuid::nil(),
            from: ExecutionState::Paused,
            to: ExecutionState::Completed,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Illegal transition"));
        assert!(msg.contains("Paused"));
        assert!(msg.contains("Completed"));
    }

    #[test]
    fn test_validation_error_display_cycle() {
        let err = ValidationError::CircularStepDependency {
            step_ids: vec!["build".to_string(), "test".to_string()],
        };
        let msg = format!("{}", err);
        assert!(msg.contains("cycle"));
        assert!(msg.contains("build"));
    }

    #[test]
    fn test_severity_and_recoverability() {
        let contention = CadreError::from(FileError::LockRejected {
            path: "src/main.rs".to_string(),
            holder: Uuid::nil(),
        });
        assert_eq!(contention.severity(), ErrorSeverity::Low);
        assert!(contention.is_recoverable());

        let malformed = CadreError::from(ValidationError::RequiredFieldMissing {
            field: "title".to_string(),
        });
        assert_eq!(malformed.severity(), ErrorSeverity::Medium);
        assert!(!malformed.is_recoverable());

        let poisoned = CadreError::from(CoordinationError::LockPoisoned);
        assert_eq!(poisoned.severity(), ErrorSeverity::Critical);
        assert!(!poisoned.is_recoverable());
    }

    #[test]
    fn test_cadre_error_from_variants() {
        let task = CadreError::from(TaskError::NotFound {
            task_id: Uuid::nil(),
        });
        assert!(matches!(task, CadreError::Task(_)));

        let file = CadreError::from(FileError::LockNotFound {
            lock_id: Uuid::nil(),
        });
        assert!(matches!(file, CadreError::File(_)));

        let validation = CadreError::from(ValidationError::RequiredFieldMissing {
            field: "title".to_string(),
        });
        assert!(matches!(validation, CadreError::Validation(_)));

        let coordination = CadreError::from(CoordinationError::LockPoisoned);
        assert!(matches!(coordination, CadreError::Coordination(_)));
    }
}
