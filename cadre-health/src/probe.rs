//! Liveness probe and recovery boundaries.

use async_trait::async_trait;
use cadre_core::{AgentId, ProbeOutcome, RecoveryKind};

/// Lightweight liveness probe against an agent.
#[async_trait]
pub trait AgentProbe: Send + Sync {
    async fn check(&self, agent_id: AgentId) -> ProbeOutcome;
}

/// Applies a recovery action to an agent. The concrete mechanics (clearing
/// state, restarting a process, migrating queued work on replace) live with
/// the agent runtime, outside this core.
#[async_trait]
pub trait RecoveryHandler: Send + Sync {
    async fn apply(&self, agent_id: AgentId, kind: RecoveryKind) -> Result<(), String>;
}

/// Recovery handler that acknowledges every action without doing anything.
/// Suitable when an external supervisor reacts to the recovery events
/// instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecoveryHandler;

#[async_trait]
impl RecoveryHandler for NoopRecoveryHandler {
    async fn apply(&self, _agent_id: AgentId, _kind: RecoveryKind) -> Result<(), String> {
        Ok(())
    }
}
