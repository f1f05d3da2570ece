//! Collaboration sessions.
//!
//! A session names a set of participant agents working a shared file list.
//! End timestamps are strictly after start timestamps: ending a session in
//! the same millisecond it started bumps the end time forward by 1ms.

use crate::{AgentId, SessionId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a collaboration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
}

/// A named set of agents collaborating on shared files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationSession {
    /// Unique identifier for this session
    pub session_id: SessionId,
    /// Session name
    pub name: String,
    /// Participating agents
    pub participants: Vec<AgentId>,
    /// Files shared across the session
    pub shared_files: Vec<String>,
    /// Current status
    pub status: SessionStatus,
    /// When the session started
    pub started_at: Timestamp,
    /// When the session ended (strictly after `started_at`)
    pub ended_at: Option<Timestamp>,
}

impl CollaborationSession {
    /// Start a new active session.
    pub fn start(name: &str, participants: Vec<AgentId>, shared_files: Vec<String>) -> Self {
        Self {
            session_id: Uuid::now_v7(),
            name: name.to_string(),
            participants,
            shared_files,
            status: SessionStatus::Active,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Pause the session.
    pub fn pause(&mut self) {
        if self.status == SessionStatus::Active {
            self.status = SessionStatus::Paused;
        }
    }

    /// Resume a paused session.
    pub fn resume(&mut self) {
        if self.status == SessionStatus::Paused {
            self.status = SessionStatus::Active;
        }
    }

    /// Complete the session, enforcing `ended_at > started_at`.
    pub fn end(&mut self) {
        let mut now = Utc::now();
        if now <= self.started_at {
            now = self.started_at + chrono::Duration::milliseconds(1);
        }
        self.status = SessionStatus::Completed;
        self.ended_at = Some(now);
    }

    /// Check whether an agent participates in this session.
    pub fn includes(&self, agent_id: AgentId) -> bool {
        self.participants.contains(&agent_id)
    }
}
