//! Agent health metrics, alerts, and recovery records.

use crate::{AgentId, EntityId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// PROBE OUTCOME
// ============================================================================

/// Result of one liveness probe against an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    /// Whether the agent answered
    pub success: bool,
    /// Probe round-trip time in milliseconds
    pub response_time_ms: i64,
    /// Error description when the probe failed
    pub error: Option<String>,
}

impl ProbeOutcome {
    /// Successful probe with a response time.
    pub fn ok(response_time_ms: i64) -> Self {
        Self {
            success: true,
            response_time_ms,
            error: None,
        }
    }

    /// Failed probe with an error description.
    pub fn failed(error: &str) -> Self {
        Self {
            success: false,
            response_time_ms: 0,
            error: Some(error.to_string()),
        }
    }
}

// ============================================================================
// HEALTH METRICS
// ============================================================================

/// Derived health status for an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Agent is fully operational
    Healthy,
    /// Operational but trending down
    Degraded,
    /// Past the failure threshold
    Unhealthy,
    /// Not yet checked
    Unknown,
}

/// Weight of the newest check in the rolling health score blend.
const SCORE_BLEND: f64 = 0.2;

/// Rolling health record for one monitored agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHealth {
    /// Agent this record describes
    pub agent_id: AgentId,
    /// Rolling score 0.0..=100.0 (exponential blend of check outcomes)
    pub health_score: f64,
    /// Consecutive failed checks
    pub consecutive_failures: u32,
    /// Consecutive successful checks
    pub consecutive_successes: u32,
    /// Hysteresis-gated healthy flag
    pub healthy: bool,
    /// When the last check ran
    pub last_check: Option<Timestamp>,
    /// Last probe error observed
    pub last_error: Option<String>,
}

impl AgentHealth {
    /// Create a fresh, optimistic record for a newly monitored agent.
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            health_score: 100.0,
            consecutive_failures: 0,
            consecutive_successes: 0,
            healthy: true,
            last_check: None,
            last_error: None,
        }
    }

    /// Fold one probe outcome into the counters and rolling score.
    /// The healthy flag is flipped by the monitor, not here, so the
    /// hysteresis thresholds stay in one place.
    pub fn observe(&mut self, outcome: &ProbeOutcome) {
        self.last_check = Some(Utc::now());
        let target = if outcome.success { 100.0 } else { 0.0 };
        self.health_score = (1.0 - SCORE_BLEND) * self.health_score + SCORE_BLEND * target;

        if outcome.success {
            self.consecutive_successes += 1;
            self.consecutive_failures = 0;
            self.last_error = None;
        } else {
            self.consecutive_failures += 1;
            self.consecutive_successes = 0;
            self.last_error = outcome.error.clone();
        }
    }

    /// Derived status from the healthy flag and the rolling score.
    pub fn status(&self) -> HealthStatus {
        if self.last_check.is_none() {
            HealthStatus::Unknown
        } else if !self.healthy {
            HealthStatus::Unhealthy
        } else if self.health_score < 60.0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

// ============================================================================
// ALERTS
// ============================================================================

/// Kind of health alert raised by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Agent crossed the failure threshold
    AgentUnresponsive,
    /// The recovery ladder was exhausted without restoring health
    RecoveryFailed,
    /// Heartbeat went stale (raised by the facade's simple sweep)
    AgentDegraded,
}

/// A raised health alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthAlert {
    /// Unique identifier for this alert
    pub alert_id: EntityId,
    /// Agent the alert concerns
    pub agent_id: AgentId,
    /// What kind of alert
    pub kind: AlertKind,
    /// Human-readable detail
    pub message: String,
    /// When the alert was raised
    pub raised_at: Timestamp,
}

impl HealthAlert {
    /// Raise a new alert now.
    pub fn new(agent_id: AgentId, kind: AlertKind, message: &str) -> Self {
        Self {
            alert_id: Uuid::now_v7(),
            agent_id,
            kind,
            message: message.to_string(),
            raised_at: Utc::now(),
        }
    }
}

// ============================================================================
// RECOVERY
// ============================================================================

/// Rung of the escalating recovery ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryKind {
    /// Clear local state, keep the process
    Reset,
    /// Reinitialize the agent
    Restart,
    /// Stop routing new work, keep monitoring
    Isolate,
    /// Alert only; operator decision required
    Escalate,
    /// Spin up a replacement and migrate queued work
    Replace,
}

impl RecoveryKind {
    /// The ladder, in escalation order.
    pub const LADDER: [RecoveryKind; 5] = [
        RecoveryKind::Reset,
        RecoveryKind::Restart,
        RecoveryKind::Isolate,
        RecoveryKind::Escalate,
        RecoveryKind::Replace,
    ];
}

/// Append-only record of one recovery attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAction {
    /// Unique identifier for this attempt
    pub action_id: EntityId,
    /// Agent the attempt targeted
    pub agent_id: AgentId,
    /// Ladder rung attempted
    pub kind: RecoveryKind,
    /// Whether the attempt reported success
    pub succeeded: bool,
    /// When the attempt ran
    pub attempted_at: Timestamp,
    /// Outcome detail
    pub note: String,
}

impl RecoveryAction {
    /// Record an attempt.
    pub fn new(agent_id: AgentId, kind: RecoveryKind, succeeded: bool, note: &str) -> Self {
        Self {
            action_id: Uuid::now_v7(),
            agent_id,
            kind,
            succeeded,
            attempted_at: Utc::now(),
            note: note.to_string(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
