//! CADRE Workflow - Declarative Multi-Agent Orchestration
//!
//! Workflows are validated at registration (unknown or cyclic step
//! dependencies are rejected up front, not discovered mid-run) and executed
//! through an explicit state machine: illegal transitions fail loudly rather
//! than silently no-op.

pub mod orchestrator;
pub mod validate;

pub use orchestrator::{AgentProvider, StepExecutor, WorkflowOrchestrator};
pub use validate::validate_definition;
