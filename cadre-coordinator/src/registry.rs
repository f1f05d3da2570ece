//! Agent registry.
//!
//! Owns the scheduling-facing `AgentInfo` snapshots. Components read cloned
//! copies, never live references into the map.

use cadre_core::{AgentError, AgentId, AgentInfo, CadreError, CadreResult, CoordinationError};
use cadre_workflow::AgentProvider;
use std::collections::HashMap;
use std::sync::RwLock;

/// Registry of known agents and their scheduling snapshots.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<AgentId, AgentInfo>>,
}

impl AgentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new agent.
    pub fn register(&self, info: AgentInfo) -> CadreResult<()> {
        let mut agents = self.guard_mut()?;
        if agents.contains_key(&info.agent_id) {
            return Err(AgentError::AlreadyRegistered {
                agent_id: info.agent_id,
            }
            .into());
        }
        agents.insert(info.agent_id, info);
        Ok(())
    }

    /// Remove an agent, returning its last snapshot.
    pub fn unregister(&self, agent_id: AgentId) -> CadreResult<AgentInfo> {
        self.guard_mut()?
            .remove(&agent_id)
            .ok_or_else(|| AgentError::NotRegistered { agent_id }.into())
    }

    /// Replace an agent's snapshot.
    pub fn update(&self, info: AgentInfo) -> CadreResult<()> {
        let mut agents = self.guard_mut()?;
        if !agents.contains_key(&info.agent_id) {
            return Err(AgentError::NotRegistered {
                agent_id: info.agent_id,
            }
            .into());
        }
        agents.insert(info.agent_id, info);
        Ok(())
    }

    /// Bump an agent's heartbeat timestamp.
    pub fn heartbeat(&self, agent_id: AgentId) -> CadreResult<()> {
        let mut agents = self.guard_mut()?;
        let agent = agents
            .get_mut(&agent_id)
            .ok_or(AgentError::NotRegistered { agent_id })?;
        agent.heartbeat();
        Ok(())
    }

    /// Adjust the running-task count on dispatch/completion.
    pub fn adjust_task_count(&self, agent_id: AgentId, delta: i64) -> CadreResult<()> {
        let mut agents = self.guard_mut()?;
        let agent = agents
            .get_mut(&agent_id)
            .ok_or(AgentError::NotRegistered { agent_id })?;
        agent.current_task_count = (agent.current_task_count as i64 + delta).max(0) as usize;
        Ok(())
    }

    /// Snapshot of one agent.
    pub fn get(&self, agent_id: AgentId) -> CadreResult<Option<AgentInfo>> {
        Ok(self.guard()?.get(&agent_id).cloned())
    }

    /// Snapshots of all agents.
    pub fn all(&self) -> CadreResult<Vec<AgentInfo>> {
        Ok(self.guard()?.values().cloned().collect())
    }

    /// Snapshots of all agents keyed by id.
    pub fn all_map(&self) -> CadreResult<HashMap<AgentId, AgentInfo>> {
        Ok(self.guard()?.clone())
    }

    fn guard(
        &self,
    ) -> CadreResult<std::sync::RwLockReadGuard<'_, HashMap<AgentId, AgentInfo>>> {
        self.agents
            .read()
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))
    }

    fn guard_mut(
        &self,
    ) -> CadreResult<std::sync::RwLockWriteGuard<'_, HashMap<AgentId, AgentInfo>>> {
        self.agents
            .write()
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))
    }
}

impl AgentProvider for AgentRegistry {
    fn list_agents(&self, agent_type: Option<&str>) -> Vec<AgentInfo> {
        self.all()
            .map(|agents| {
                agents
                    .into_iter()
                    .filter(|a| agent_type.is_none_or(|t| a.agent_type == t))
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ============================================================================
// TESTS
// ============================================================================
