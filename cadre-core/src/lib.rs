//! CADRE Core - Entity Types
//!
//! Data records, enums, errors, configuration, and the coordination event
//! vocabulary shared by every CADRE crate. Component logic (scheduling,
//! assignment, orchestration) lives in the sibling crates; this crate defines
//! what flows between them.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub mod agent;
pub mod config;
pub mod conflict;
pub mod error;
pub mod event;
pub mod health;
pub mod lock;
pub mod session;
pub mod task;
pub mod workflow;

pub use agent::{AgentInfo, AgentPerformance};
pub use config::{
    AssignmentConfig, AssignmentWeights, CadreConfig, CoordinatorConfig, FileCoordinatorConfig,
    HealthMonitorConfig, SchedulerConfig, WorkflowConfig,
};
pub use conflict::{
    ChangeKind, Conflict, ConflictKind, ConflictResolution, FileChange, FileSnapshot,
    ResolutionKind,
};
pub use error::{
    AgentError, CadreError, CadreResult, ConfigError, CoordinationError, ErrorSeverity, FileError,
    HealthError, SchedulingError, TaskError, ValidationError, WorkflowError,
};
pub use event::{CoordinationEvent, EventBus, EventBusError, EventReceiver};
pub use health::{
    AgentHealth, AlertKind, HealthAlert, HealthStatus, ProbeOutcome, RecoveryAction, RecoveryKind,
};
pub use lock::{compute_path_key, FileLock, LockKind};
pub use session::{CollaborationSession, SessionStatus};
pub use task::{Task, TaskPriority, TaskQueueEntry, TaskStatus};
pub use workflow::{
    ExecutionLogEntry, ExecutionState, LogLevel, StepOutcome, StepState, WorkflowDefinition,
    WorkflowExecution, WorkflowStep,
};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Duration in milliseconds for estimates, TTLs, and timeout values.
pub type DurationMs = i64;

/// SHA-256 content hash for snapshot deduplication and diffing.
pub type ContentHash = [u8; 32];

/// Identifier for a task.
pub type TaskId = EntityId;
/// Identifier for an agent.
pub type AgentId = EntityId;
/// Identifier for a file lock.
pub type LockId = EntityId;
/// Identifier for a detected conflict.
pub type ConflictId = EntityId;
/// Identifier for a workflow definition.
pub type WorkflowId = EntityId;
/// Identifier for a workflow execution.
pub type ExecutionId = EntityId;
/// Identifier for a collaboration session.
pub type SessionId = EntityId;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ids_are_sortable_by_creation() {
        let a = new_entity_id();
        let b = new_entity_id();
        // UUIDv7 embeds the timestamp in the most significant bits.
        assert!(a <= b);
    }

    #[test]
    fn test_content_hash_deterministic() {
        let h1 = compute_content_hash(b"fn main() {}");
        let h2 = compute_content_hash(b"fn main() {}");
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_content_hash_differs() {
        let h1 = compute_content_hash(b"left");
        let h2 = compute_content_hash(b"right");
        assert_ne!(h1, h2);
    }
}
