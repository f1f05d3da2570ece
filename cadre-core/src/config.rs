//! Configuration types
//!
//! Every timeout, threshold, and weight in CADRE is a tunable with an
//! observed default, not a mandated constant. Each subsystem gets its own
//! config struct with `Default`, `from_env()` (reading `CADRE_*` variables
//! with fallback), and `validate()`.

use crate::{CadreResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

// ============================================================================
// SCHEDULER
// ============================================================================

/// Configuration for the task scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Workload above which an agent stops receiving new queue entries
    pub overload_threshold: u8,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            overload_threshold: 90,
        }
    }
}

impl SchedulerConfig {
    /// Read from environment with fallback to defaults.
    ///
    /// # Environment Variables
    /// - `CADRE_SCHEDULER_OVERLOAD_THRESHOLD`: workload cutoff (default: 90)
    pub fn from_env() -> Self {
        Self {
            overload_threshold: env_u64("CADRE_SCHEDULER_OVERLOAD_THRESHOLD", 90).min(100) as u8,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> CadreResult<()> {
        if self.overload_threshold == 0 || self.overload_threshold > 100 {
            return Err(invalid(
                "overload_threshold",
                self.overload_threshold,
                "must be in 1..=100",
            )
            .into());
        }
        Ok(())
    }
}

// ============================================================================
// ASSIGNMENT
// ============================================================================

/// Weights for the six assignment scoring criteria. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssignmentWeights {
    /// Agent type vs. task type match
    pub specialization: f64,
    /// Inverse workload
    pub workload_balance: f64,
    /// Required-capability coverage
    pub capability_match: f64,
    /// Task priority urgency
    pub task_priority: f64,
    /// Estimated-duration fit against the agent's mean completion time
    pub time_fit: f64,
    /// Historical performance for this agent and task type
    pub historical_performance: f64,
}

impl Default for AssignmentWeights {
    fn default() -> Self {
        Self {
            specialization: 0.30,
            workload_balance: 0.20,
            capability_match: 0.20,
            task_priority: 0.10,
            time_fit: 0.10,
            historical_performance: 0.10,
        }
    }
}

impl AssignmentWeights {
    /// Sum of all six weights.
    pub fn total(&self) -> f64 {
        self.specialization
            + self.workload_balance
            + self.capability_match
            + self.task_priority
            + self.time_fit
            + self.historical_performance
    }

    /// Validate that weights are non-negative and sum to 1.0.
    pub fn validate(&self) -> CadreResult<()> {
        let fields = [
            ("specialization", self.specialization),
            ("workload_balance", self.workload_balance),
            ("capability_match", self.capability_match),
            ("task_priority", self.task_priority),
            ("time_fit", self.time_fit),
            ("historical_performance", self.historical_performance),
        ];
        for (name, value) in fields {
            if value < 0.0 {
                return Err(invalid(name, value, "weight must be non-negative").into());
            }
        }
        let total = self.total();
        if (total - 1.0).abs() > 1e-6 {
            return Err(invalid("weights", total, "weights must sum to 1.0").into());
        }
        Ok(())
    }
}

/// Configuration for the assignment engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentConfig {
    /// Scoring weights
    pub weights: AssignmentWeights,
    /// Expected end = estimated duration x this factor
    pub slack_factor: f64,
    /// Grace past the expected end before a timeout trigger fires
    pub timeout_grace: Duration,
    /// Expected heartbeat cadence from executing agents
    pub heartbeat_interval: Duration,
    /// Missed-heartbeat multiplier before an agent_failure trigger fires
    pub heartbeat_miss_threshold: u32,
    /// Workload below which an agent counts as comparatively idle
    pub idle_workload_threshold: u8,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            weights: AssignmentWeights::default(),
            slack_factor: 1.5,
            timeout_grace: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_miss_threshold: 3,
            idle_workload_threshold: 30,
        }
    }
}

impl AssignmentConfig {
    /// Read from environment with fallback to defaults.
    ///
    /// # Environment Variables
    /// - `CADRE_ASSIGNMENT_SLACK_FACTOR`: expected-end slack factor (default: 1.5)
    /// - `CADRE_ASSIGNMENT_TIMEOUT_GRACE_SECS`: timeout grace window (default: 30)
    /// - `CADRE_ASSIGNMENT_HEARTBEAT_INTERVAL_SECS`: heartbeat cadence (default: 30)
    /// - `CADRE_ASSIGNMENT_HEARTBEAT_MISS_THRESHOLD`: missed beats before failure (default: 3)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            weights: defaults.weights,
            slack_factor: env_f64("CADRE_ASSIGNMENT_SLACK_FACTOR", 1.5),
            timeout_grace: Duration::from_secs(env_u64("CADRE_ASSIGNMENT_TIMEOUT_GRACE_SECS", 30)),
            heartbeat_interval: Duration::from_secs(env_u64(
                "CADRE_ASSIGNMENT_HEARTBEAT_INTERVAL_SECS",
                30,
            )),
            heartbeat_miss_threshold: env_u64("CADRE_ASSIGNMENT_HEARTBEAT_MISS_THRESHOLD", 3)
                as u32,
            idle_workload_threshold: defaults.idle_workload_threshold,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> CadreResult<()> {
        self.weights.validate()?;
        if self.slack_factor < 1.0 {
            return Err(invalid("slack_factor", self.slack_factor, "must be >= 1.0").into());
        }
        if self.heartbeat_interval.is_zero() {
            return Err(invalid(
                "heartbeat_interval",
                format!("{:?}", self.heartbeat_interval),
                "must be positive",
            )
            .into());
        }
        if self.heartbeat_miss_threshold == 0 {
            return Err(invalid(
                "heartbeat_miss_threshold",
                self.heartbeat_miss_threshold,
                "must be at least 1",
            )
            .into());
        }
        Ok(())
    }
}

// ============================================================================
// WORKFLOW
// ============================================================================

/// Configuration for the workflow orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Retry budget for steps that do not override it
    pub default_max_retries: u32,
    /// Base delay for linear retry backoff (attempt x base)
    pub retry_backoff_base: Duration,
    /// How long to wait before re-checking for an available agent
    pub step_recheck_interval: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            default_max_retries: 3,
            retry_backoff_base: Duration::from_secs(1),
            step_recheck_interval: Duration::from_secs(2),
        }
    }
}

impl WorkflowConfig {
    /// Read from environment with fallback to defaults.
    ///
    /// # Environment Variables
    /// - `CADRE_WORKFLOW_MAX_RETRIES`: default per-step retry budget (default: 3)
    /// - `CADRE_WORKFLOW_BACKOFF_BASE_MS`: linear backoff base (default: 1000)
    /// - `CADRE_WORKFLOW_RECHECK_INTERVAL_MS`: agent re-check interval (default: 2000)
    pub fn from_env() -> Self {
        Self {
            default_max_retries: env_u64("CADRE_WORKFLOW_MAX_RETRIES", 3) as u32,
            retry_backoff_base: Duration::from_millis(env_u64(
                "CADRE_WORKFLOW_BACKOFF_BASE_MS",
                1_000,
            )),
            step_recheck_interval: Duration::from_millis(env_u64(
                "CADRE_WORKFLOW_RECHECK_INTERVAL_MS",
                2_000,
            )),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> CadreResult<()> {
        if self.step_recheck_interval.is_zero() {
            return Err(invalid(
                "step_recheck_interval",
                format!("{:?}", self.step_recheck_interval),
                "must be positive",
            )
            .into());
        }
        Ok(())
    }
}

// ============================================================================
// FILE COORDINATOR
// ============================================================================

/// Configuration for the file access coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCoordinatorConfig {
    /// Default lock TTL
    pub default_lock_ttl: Duration,
    /// Cadence of the expiry sweep
    pub sweep_interval: Duration,
    /// Window within which two agents' changes count as concurrent
    pub conflict_window: Duration,
    /// Maximum change-history entries retained per file
    pub history_cap: usize,
    /// Content size at or above which writes trigger a snapshot
    pub snapshot_threshold: usize,
}

impl Default for FileCoordinatorConfig {
    fn default() -> Self {
        Self {
            default_lock_ttl: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(10),
            conflict_window: Duration::from_secs(5),
            history_cap: 100,
            snapshot_threshold: 1024,
        }
    }
}

impl FileCoordinatorConfig {
    /// Read from environment with fallback to defaults.
    ///
    /// # Environment Variables
    /// - `CADRE_FILES_LOCK_TTL_SECS`: default lock TTL (default: 30)
    /// - `CADRE_FILES_SWEEP_INTERVAL_SECS`: expiry sweep cadence (default: 10)
    /// - `CADRE_FILES_CONFLICT_WINDOW_MS`: concurrent-change window (default: 5000)
    /// - `CADRE_FILES_HISTORY_CAP`: per-file history bound (default: 100)
    /// - `CADRE_FILES_SNAPSHOT_THRESHOLD`: snapshot size cutoff in bytes (default: 1024)
    pub fn from_env() -> Self {
        Self {
            default_lock_ttl: Duration::from_secs(env_u64("CADRE_FILES_LOCK_TTL_SECS", 30)),
            sweep_interval: Duration::from_secs(env_u64("CADRE_FILES_SWEEP_INTERVAL_SECS", 10)),
            conflict_window: Duration::from_millis(env_u64("CADRE_FILES_CONFLICT_WINDOW_MS", 5_000)),
            history_cap: env_u64("CADRE_FILES_HISTORY_CAP", 100) as usize,
            snapshot_threshold: env_u64("CADRE_FILES_SNAPSHOT_THRESHOLD", 1024) as usize,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> CadreResult<()> {
        if self.default_lock_ttl.is_zero() {
            return Err(invalid(
                "default_lock_ttl",
                format!("{:?}", self.default_lock_ttl),
                "must be positive",
            )
            .into());
        }
        if self.history_cap == 0 {
            return Err(invalid("history_cap", self.history_cap, "must be at least 1").into());
        }
        Ok(())
    }
}

// ============================================================================
// HEALTH MONITOR
// ============================================================================

/// Configuration for the agent health monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMonitorConfig {
    /// Cadence of per-agent liveness probes
    pub check_interval: Duration,
    /// Probe timeout; a slower answer counts as a failed check
    pub probe_timeout: Duration,
    /// Consecutive failures before the healthy flag drops
    pub failure_threshold: u32,
    /// Consecutive successes before the healthy flag recovers
    pub recovery_threshold: u32,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            failure_threshold: 3,
            recovery_threshold: 2,
        }
    }
}

impl HealthMonitorConfig {
    /// Read from environment with fallback to defaults.
    ///
    /// # Environment Variables
    /// - `CADRE_HEALTH_CHECK_INTERVAL_SECS`: probe cadence (default: 30)
    /// - `CADRE_HEALTH_PROBE_TIMEOUT_SECS`: probe timeout (default: 5)
    /// - `CADRE_HEALTH_FAILURE_THRESHOLD`: failures before unhealthy (default: 3)
    /// - `CADRE_HEALTH_RECOVERY_THRESHOLD`: successes before healthy (default: 2)
    pub fn from_env() -> Self {
        Self {
            check_interval: Duration::from_secs(env_u64("CADRE_HEALTH_CHECK_INTERVAL_SECS", 30)),
            probe_timeout: Duration::from_secs(env_u64("CADRE_HEALTH_PROBE_TIMEOUT_SECS", 5)),
            failure_threshold: env_u64("CADRE_HEALTH_FAILURE_THRESHOLD", 3) as u32,
            recovery_threshold: env_u64("CADRE_HEALTH_RECOVERY_THRESHOLD", 2) as u32,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> CadreResult<()> {
        if self.check_interval.is_zero() {
            return Err(invalid(
                "check_interval",
                format!("{:?}", self.check_interval),
                "must be positive",
            )
            .into());
        }
        if self.failure_threshold == 0 {
            return Err(invalid(
                "failure_threshold",
                self.failure_threshold,
                "must be at least 1",
            )
            .into());
        }
        if self.recovery_threshold == 0 {
            return Err(invalid(
                "recovery_threshold",
                self.recovery_threshold,
                "must be at least 1",
            )
            .into());
        }
        Ok(())
    }
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// Configuration for the coordination facade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Event bus buffer capacity
    pub event_capacity: usize,
    /// Cadence of the reassignment-detection tick
    pub reassignment_tick: Duration,
    /// Cadence of the facade's lightweight heartbeat sweep
    pub simple_sweep_interval: Duration,
    /// Heartbeat age past which the simple sweep flags an agent
    pub heartbeat_stale_after: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            event_capacity: 1024,
            reassignment_tick: Duration::from_secs(15),
            simple_sweep_interval: Duration::from_secs(60),
            heartbeat_stale_after: Duration::from_secs(120),
        }
    }
}

impl CoordinatorConfig {
    /// Read from environment with fallback to defaults.
    ///
    /// # Environment Variables
    /// - `CADRE_EVENT_CAPACITY`: event bus buffer size (default: 1024)
    /// - `CADRE_REASSIGNMENT_TICK_SECS`: reassignment scan cadence (default: 15)
    /// - `CADRE_SIMPLE_SWEEP_INTERVAL_SECS`: heartbeat sweep cadence (default: 60)
    /// - `CADRE_HEARTBEAT_STALE_AFTER_SECS`: stale heartbeat cutoff (default: 120)
    pub fn from_env() -> Self {
        Self {
            event_capacity: env_u64("CADRE_EVENT_CAPACITY", 1024) as usize,
            reassignment_tick: Duration::from_secs(env_u64("CADRE_REASSIGNMENT_TICK_SECS", 15)),
            simple_sweep_interval: Duration::from_secs(env_u64(
                "CADRE_SIMPLE_SWEEP_INTERVAL_SECS",
                60,
            )),
            heartbeat_stale_after: Duration::from_secs(env_u64(
                "CADRE_HEARTBEAT_STALE_AFTER_SECS",
                120,
            )),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> CadreResult<()> {
        if self.event_capacity == 0 {
            return Err(invalid("event_capacity", self.event_capacity, "must be at least 1").into());
        }
        Ok(())
    }
}

// ============================================================================
// MASTER CONFIG
// ============================================================================

/// Master configuration for a CADRE deployment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CadreConfig {
    pub scheduler: SchedulerConfig,
    pub assignment: AssignmentConfig,
    pub workflow: WorkflowConfig,
    pub files: FileCoordinatorConfig,
    pub health: HealthMonitorConfig,
    pub coordinator: CoordinatorConfig,
}

impl CadreConfig {
    /// Read every subsystem config from the environment.
    pub fn from_env() -> Self {
        Self {
            scheduler: SchedulerConfig::from_env(),
            assignment: AssignmentConfig::from_env(),
            workflow: WorkflowConfig::from_env(),
            files: FileCoordinatorConfig::from_env(),
            health: HealthMonitorConfig::from_env(),
            coordinator: CoordinatorConfig::from_env(),
        }
    }

    /// Validate every subsystem config.
    pub fn validate(&self) -> CadreResult<()> {
        self.scheduler.validate()?;
        self.assignment.validate()?;
        self.workflow.validate()?;
        self.files.validate()?;
        self.health.validate()?;
        self.coordinator.validate()?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        CadreConfig::default().validate().unwrap();
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let weights = AssignmentWeights::default();
        assert!((weights.total() - 1.0).abs() < 1e-9);
        weights.validate().unwrap();
    }

    #[test]
    fn test_bad_weight_sum_rejected() {
        let weights = AssignmentWeights {
            specialization: 0.9,
            ..AssignmentWeights::default()
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let weights = AssignmentWeights {
            specialization: -0.1,
            workload_balance: 0.4,
            capability_match: 0.3,
            task_priority: 0.2,
            time_fit: 0.1,
            historical_performance: 0.1,
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_zero_thresholds_rejected() {
        let config = HealthMonitorConfig {
            failure_threshold: 0,
            ..HealthMonitorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SchedulerConfig {
            overload_threshold: 0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_slack_factor_below_one_rejected() {
        let config = AssignmentConfig {
            slack_factor: 0.5,
            ..AssignmentConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
