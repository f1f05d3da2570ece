//! Agent health monitor.
//!
//! One independent periodic check loop per watched agent. `is_healthy` flips
//! false only after `failure_threshold` consecutive failures and back true
//! only after `recovery_threshold` consecutive successes. Crossing into
//! unhealthy raises exactly one alert and starts walking the recovery
//! ladder; each further failed check escalates one rung.

use crate::probe::{AgentProbe, RecoveryHandler};
use cadre_core::{
    AgentHealth, AgentId, AlertKind, CadreError, CadreResult, CoordinationError,
    CoordinationEvent, EventBus, HealthAlert, HealthError, HealthMonitorConfig, ProbeOutcome,
    RecoveryAction, RecoveryKind,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// METRICS
// ============================================================================

/// Counters for monitor activity.
#[derive(Debug, Default)]
pub struct MonitorMetrics {
    /// Probes executed since startup
    pub checks_run: AtomicU64,
    /// Failed probe outcomes observed
    pub failures_observed: AtomicU64,
    /// Recovery actions attempted
    pub recoveries_attempted: AtomicU64,
    /// Alerts raised
    pub alerts_raised: AtomicU64,
}

impl MonitorMetrics {
    /// Current snapshot of all counters.
    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            checks_run: self.checks_run.load(Ordering::Relaxed),
            failures_observed: self.failures_observed.load(Ordering::Relaxed),
            recoveries_attempted: self.recoveries_attempted.load(Ordering::Relaxed),
            alerts_raised: self.alerts_raised.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the monitor counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSnapshot {
    pub checks_run: u64,
    pub failures_observed: u64,
    pub recoveries_attempted: u64,
    pub alerts_raised: u64,
}

// ============================================================================
// MONITOR
// ============================================================================

struct Inner {
    health: RwLock<HashMap<AgentId, AgentHealth>>,
    ladder_pos: RwLock<HashMap<AgentId, usize>>,
    exhausted: RwLock<std::collections::HashSet<AgentId>>,
    actions: RwLock<Vec<RecoveryAction>>,
    alerts: RwLock<Vec<HealthAlert>>,
    tasks: Mutex<HashMap<AgentId, JoinHandle<()>>>,
    probe: Arc<dyn AgentProbe>,
    recovery: Arc<dyn RecoveryHandler>,
    config: HealthMonitorConfig,
    bus: EventBus,
    metrics: MonitorMetrics,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Heartbeat-driven failure detection with an escalating recovery ladder.
#[derive(Clone)]
pub struct HealthMonitor {
    inner: Arc<Inner>,
}

impl HealthMonitor {
    /// Create a monitor around a probe and recovery handler.
    pub fn new(
        probe: Arc<dyn AgentProbe>,
        recovery: Arc<dyn RecoveryHandler>,
        config: HealthMonitorConfig,
        bus: EventBus,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                health: RwLock::new(HashMap::new()),
                ladder_pos: RwLock::new(HashMap::new()),
                exhausted: RwLock::new(std::collections::HashSet::new()),
                actions: RwLock::new(Vec::new()),
                alerts: RwLock::new(Vec::new()),
                tasks: Mutex::new(HashMap::new()),
                probe,
                recovery,
                config,
                bus,
                metrics: MonitorMetrics::default(),
                shutdown_tx,
                shutdown_rx,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Watching
    // ------------------------------------------------------------------

    /// Start a periodic check loop for an agent.
    pub fn watch_agent(&self, agent_id: AgentId) -> CadreResult<()> {
        self.write_health()?
            .entry(agent_id)
            .or_insert_with(|| AgentHealth::new(agent_id));

        let monitor = self.clone();
        let mut shutdown_rx = self.inner.shutdown_rx.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(monitor.inner.config.check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(agent_id = %agent_id, "health check loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if let Err(error) = monitor.run_check(agent_id).await {
                            tracing::error!(agent_id = %agent_id, %error, "health check errored");
                        }
                    }
                }
            }
            tracing::info!(agent_id = %agent_id, "health check loop stopped");
        });
        self.lock_tasks()?.insert(agent_id, handle);
        Ok(())
    }

    /// Stop checking an agent. Its health record is retained.
    pub fn unwatch_agent(&self, agent_id: AgentId) -> CadreResult<()> {
        if let Some(handle) = self.lock_tasks()?.remove(&agent_id) {
            handle.abort();
        }
        Ok(())
    }

    /// Stop every check loop.
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown_tx.send(true);
    }

    /// Snapshot of the monitor counters.
    pub fn metrics(&self) -> MonitorSnapshot {
        self.inner.metrics.snapshot()
    }

    // ------------------------------------------------------------------
    // Checking
    // ------------------------------------------------------------------

    /// Run one probe against an agent and fold the outcome in. The probe is
    /// raced against the configured timeout; the timer winning counts as a
    /// failed check, the probe itself is not interrupted further.
    pub async fn run_check(&self, agent_id: AgentId) -> CadreResult<AgentHealth> {
        let outcome = match tokio::time::timeout(
            self.inner.config.probe_timeout,
            self.inner.probe.check(agent_id),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => ProbeOutcome::failed("probe timed out"),
        };
        self.inner.metrics.checks_run.fetch_add(1, Ordering::Relaxed);
        self.apply_outcome(agent_id, outcome).await
    }

    /// Fold a probe outcome into the agent's record, applying hysteresis and
    /// driving recovery. Exposed for hosts that probe agents themselves.
    pub async fn apply_outcome(
        &self,
        agent_id: AgentId,
        outcome: ProbeOutcome,
    ) -> CadreResult<AgentHealth> {
        if !outcome.success {
            self.inner
                .metrics
                .failures_observed
                .fetch_add(1, Ordering::Relaxed);
        }

        let (snapshot, crossed_down, still_unhealthy) = {
            let mut health = self.write_health()?;
            let record = health
                .get_mut(&agent_id)
                .ok_or(HealthError::NotMonitored { agent_id })?;
            record.observe(&outcome);

            let mut crossed_down = false;
            if record.healthy
                && record.consecutive_failures >= self.inner.config.failure_threshold
            {
                record.healthy = false;
                crossed_down = true;
            } else if !record.healthy
                && record.consecutive_successes >= self.inner.config.recovery_threshold
            {
                record.healthy = true;
            }

            if record.healthy {
                // Recovered (or never down): the ladder starts over next time.
                self.inner
                    .ladder_pos
                    .write()
                    .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))?
                    .remove(&agent_id);
                self.inner
                    .exhausted
                    .write()
                    .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))?
                    .remove(&agent_id);
            }
            (record.clone(), crossed_down, !record.healthy)
        };

        if crossed_down {
            self.raise_alert(
                agent_id,
                AlertKind::AgentUnresponsive,
                &format!(
                    "{} consecutive failed checks (last error: {})",
                    snapshot.consecutive_failures,
                    snapshot.last_error.as_deref().unwrap_or("none")
                ),
            )?;
        }

        // Every failed check while unhealthy walks one rung further.
        if still_unhealthy && !outcome.success {
            self.attempt_recovery(agent_id).await?;
        }
        Ok(snapshot)
    }

    /// Attempt the next rung of the recovery ladder for an agent. Past the
    /// top of the ladder a single distinct alert is raised instead of
    /// looping.
    pub async fn attempt_recovery(&self, agent_id: AgentId) -> CadreResult<()> {
        let pos = {
            let ladder = self
                .inner
                .ladder_pos
                .read()
                .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))?;
            ladder.get(&agent_id).copied().unwrap_or(0)
        };

        if pos >= RecoveryKind::LADDER.len() {
            let first_time = self
                .inner
                .exhausted
                .write()
                .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))?
                .insert(agent_id);
            if first_time {
                self.raise_alert(
                    agent_id,
                    AlertKind::RecoveryFailed,
                    "recovery ladder exhausted without restoring health",
                )?;
            }
            return Ok(());
        }

        let kind = RecoveryKind::LADDER[pos];
        self.inner
            .ladder_pos
            .write()
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))?
            .insert(agent_id, pos + 1);

        tracing::warn!(agent_id = %agent_id, ?kind, rung = pos, "attempting recovery");
        self.inner
            .metrics
            .recoveries_attempted
            .fetch_add(1, Ordering::Relaxed);
        let result = self.inner.recovery.apply(agent_id, kind).await;
        let action = match &result {
            Ok(()) => RecoveryAction::new(agent_id, kind, true, "handler acknowledged"),
            Err(reason) => RecoveryAction::new(agent_id, kind, false, reason),
        };

        self.inner
            .actions
            .write()
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))?
            .push(action.clone());
        self.inner
            .bus
            .publish(CoordinationEvent::RecoveryAttempted { action });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Health record for an agent.
    pub fn health_of(&self, agent_id: AgentId) -> CadreResult<Option<AgentHealth>> {
        Ok(self.read_health()?.get(&agent_id).cloned())
    }

    /// Hysteresis-gated healthy flag for an agent (unknown agents are not
    /// healthy).
    pub fn is_healthy(&self, agent_id: AgentId) -> CadreResult<bool> {
        Ok(self
            .read_health()?
            .get(&agent_id)
            .is_some_and(|h| h.healthy))
    }

    /// All health records.
    pub fn all_health(&self) -> CadreResult<Vec<AgentHealth>> {
        Ok(self.read_health()?.values().cloned().collect())
    }

    /// Append-only recovery action log.
    pub fn actions(&self) -> CadreResult<Vec<RecoveryAction>> {
        self.inner
            .actions
            .read()
            .map(|a| a.clone())
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))
    }

    /// All raised alerts, oldest first.
    pub fn alerts(&self) -> CadreResult<Vec<HealthAlert>> {
        self.inner
            .alerts
            .read()
            .map(|a| a.clone())
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))
    }

    fn raise_alert(&self, agent_id: AgentId, kind: AlertKind, message: &str) -> CadreResult<()> {
        let alert = HealthAlert::new(agent_id, kind, message);
        tracing::warn!(agent_id = %agent_id, ?kind, message, "health alert");
        self.inner.metrics.alerts_raised.fetch_add(1, Ordering::Relaxed);
        self.inner
            .alerts
            .write()
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))?
            .push(alert.clone());
        self.inner
            .bus
            .publish(CoordinationEvent::HealthAlertRaised { alert });
        Ok(())
    }

    fn read_health(
        &self,
    ) -> CadreResult<std::sync::RwLockReadGuard<'_, HashMap<AgentId, AgentHealth>>> {
        self.inner
            .health
            .read()
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))
    }

    fn write_health(
        &self,
    ) -> CadreResult<std::sync::RwLockWriteGuard<'_, HashMap<AgentId, AgentHealth>>> {
        self.inner
            .health
            .write()
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))
    }

    fn lock_tasks(
        &self,
    ) -> CadreResult<std::sync::MutexGuard<'_, HashMap<AgentId, JoinHandle<()>>>> {
        self.inner
            .tasks
            .lock()
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;
    use uuid::Uuid;

    /// Probe that pops scripted outcomes, succeeding once the script runs dry.
    struct ScriptedProbe {
        script: Mutex<VecDeque<ProbeOutcome>>,
    }

    impl ScriptedProbe {
        fn new(outcomes: Vec<ProbeOutcome>) -> Self {
            Self {
                script: Mutex::new(outcomes.into()),
            }
        }
    }

    #[async_trait]
    impl AgentProbe for ScriptedProbe {
        async fn check(&self, _agent_id: AgentId) -> ProbeOutcome {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| ProbeOutcome::ok(5))
        }
    }

    /// Recovery handler that records what it was asked to do.
    #[derive(Default)]
    struct RecordingRecovery {
        applied: Mutex<Vec<RecoveryKind>>,
        fail: bool,
    }

    #[async_trait]
    impl RecoveryHandler for RecordingRecovery {
        async fn apply(&self, _agent_id: AgentId, kind: RecoveryKind) -> Result<(), String> {
            self.applied.lock().unwrap().push(kind);
            if self.fail {
                Err("handler refused".to_string())
            } else {
                Ok(())
            }
        }
    }

    fn monitor_with(probe: Arc<dyn AgentProbe>, recovery: Arc<dyn RecoveryHandler>) -> HealthMonitor {
        HealthMonitor::new(
            probe,
            recovery,
            HealthMonitorConfig::default(),
            EventBus::new(256),
        )
    }

    fn watch_silently(monitor: &HealthMonitor, agent_id: AgentId) {
        // Register the record without spawning the loop; tests drive
        // run_check directly.
        monitor
            .write_health()
            .unwrap()
            .insert(agent_id, AgentHealth::new(agent_id));
    }

    #[tokio::test]
    async fn test_hysteresis_flips_down_then_up() {
        let probe = Arc::new(ScriptedProbe::new(vec![
            ProbeOutcome::failed("down"),
            ProbeOutcome::failed("down"),
            ProbeOutcome::failed("down"),
            ProbeOutcome::ok(3),
            ProbeOutcome::ok(3),
        ]));
        let monitor = monitor_with(probe, Arc::new(RecordingRecovery::default()));
        let agent = Uuid::now_v7();
        watch_silently(&monitor, agent);

        // Two failures: still healthy (threshold is 3).
        monitor.run_check(agent).await.unwrap();
        monitor.run_check(agent).await.unwrap();
        assert!(monitor.is_healthy(agent).unwrap());

        // Third failure crosses the threshold.
        monitor.run_check(agent).await.unwrap();
        assert!(!monitor.is_healthy(agent).unwrap());

        // Exactly one unresponsive alert for the crossing.
        let unresponsive: Vec<_> = monitor
            .alerts()
            .unwrap()
            .into_iter()
            .filter(|a| a.kind == AlertKind::AgentUnresponsive)
            .collect();
        assert_eq!(unresponsive.len(), 1);

        // One success is not enough (recovery threshold is 2).
        monitor.run_check(agent).await.unwrap();
        assert!(!monitor.is_healthy(agent).unwrap());

        monitor.run_check(agent).await.unwrap();
        assert!(monitor.is_healthy(agent).unwrap());
    }

    #[tokio::test]
    async fn test_recovery_ladder_escalates_in_order() {
        let probe = Arc::new(ScriptedProbe::new(vec![
            ProbeOutcome::failed("x");
            8
        ]));
        let recovery = Arc::new(RecordingRecovery::default());
        let monitor = monitor_with(probe, recovery.clone());
        let agent = Uuid::now_v7();
        watch_silently(&monitor, agent);

        for _ in 0..8 {
            monitor.run_check(agent).await.unwrap();
        }

        // Crossing happened at failure 3; failures 3..8 walked the ladder.
        let applied = recovery.applied.lock().unwrap().clone();
        assert_eq!(
            applied,
            vec![
                RecoveryKind::Reset,
                RecoveryKind::Restart,
                RecoveryKind::Isolate,
                RecoveryKind::Escalate,
                RecoveryKind::Replace,
            ]
        );
        let actions = monitor.actions().unwrap();
        assert_eq!(actions.len(), 5);
        assert!(actions.iter().all(|a| a.succeeded));
    }

    #[tokio::test]
    async fn test_exhausted_ladder_raises_recovery_failed_once() {
        let probe = Arc::new(ScriptedProbe::new(vec![
            ProbeOutcome::failed("x");
            12
        ]));
        let monitor = monitor_with(probe, Arc::new(RecordingRecovery::default()));
        let agent = Uuid::now_v7();
        watch_silently(&monitor, agent);

        for _ in 0..12 {
            monitor.run_check(agent).await.unwrap();
        }

        let failed: Vec<_> = monitor
            .alerts()
            .unwrap()
            .into_iter()
            .filter(|a| a.kind == AlertKind::RecoveryFailed)
            .collect();
        assert_eq!(failed.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_handler_is_recorded() {
        let probe = Arc::new(ScriptedProbe::new(vec![
            ProbeOutcome::failed("x");
            4
        ]));
        let recovery = Arc::new(RecordingRecovery {
            applied: Mutex::new(Vec::new()),
            fail: true,
        });
        let monitor = monitor_with(probe, recovery);
        let agent = Uuid::now_v7();
        watch_silently(&monitor, agent);

        for _ in 0..4 {
            monitor.run_check(agent).await.unwrap();
        }
        let actions = monitor.actions().unwrap();
        assert!(!actions.is_empty());
        assert!(actions.iter().all(|a| !a.succeeded));
        assert!(actions[0].note.contains("handler refused"));
    }

    #[tokio::test]
    async fn test_recovery_resets_after_health_restored() {
        let probe = Arc::new(ScriptedProbe::new(vec![
            ProbeOutcome::failed("x"),
            ProbeOutcome::failed("x"),
            ProbeOutcome::failed("x"),
            ProbeOutcome::ok(1),
            ProbeOutcome::ok(1),
            ProbeOutcome::failed("y"),
            ProbeOutcome::failed("y"),
            ProbeOutcome::failed("y"),
        ]));
        let recovery = Arc::new(RecordingRecovery::default());
        let monitor = monitor_with(probe, recovery.clone());
        let agent = Uuid::now_v7();
        watch_silently(&monitor, agent);

        for _ in 0..8 {
            monitor.run_check(agent).await.unwrap();
        }

        // Second outage starts the ladder from the bottom again.
        let applied = recovery.applied.lock().unwrap().clone();
        assert_eq!(applied, vec![RecoveryKind::Reset, RecoveryKind::Reset]);
    }

    #[tokio::test]
    async fn test_slow_probe_counts_as_failure() {
        struct SlowProbe;

        #[async_trait]
        impl AgentProbe for SlowProbe {
            async fn check(&self, _agent_id: AgentId) -> ProbeOutcome {
                tokio::time::sleep(Duration::from_secs(60)).await;
                ProbeOutcome::ok(1)
            }
        }

        let monitor = HealthMonitor::new(
            Arc::new(SlowProbe),
            Arc::new(RecordingRecovery::default()),
            HealthMonitorConfig {
                probe_timeout: Duration::from_millis(10),
                ..HealthMonitorConfig::default()
            },
            EventBus::new(16),
        );
        let agent = Uuid::now_v7();
        watch_silently(&monitor, agent);

        let health = monitor.run_check(agent).await.unwrap();
        assert_eq!(health.consecutive_failures, 1);
        assert_eq!(health.last_error.as_deref(), Some("probe timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_loop_runs_periodically_and_shuts_down() {
        let probe = Arc::new(ScriptedProbe::new(vec![]));
        let monitor = monitor_with(probe, Arc::new(RecordingRecovery::default()));
        let agent = Uuid::now_v7();
        monitor.watch_agent(agent).unwrap();

        // Three intervals elapse under the paused clock.
        tokio::time::sleep(Duration::from_secs(95)).await;
        assert!(monitor.metrics().checks_run >= 3);
        assert!(monitor.is_healthy(agent).unwrap());

        monitor.shutdown();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let before = monitor.metrics().checks_run;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(monitor.metrics().checks_run, before);
    }

    #[tokio::test]
    async fn test_unwatched_agent_errors() {
        let probe = Arc::new(ScriptedProbe::new(vec![]));
        let monitor = monitor_with(probe, Arc::new(RecordingRecovery::default()));
        let err = monitor.run_check(Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(
            err,
            CadreError::Health(HealthError::NotMonitored { .. })
        ));
    }
}
