//! Background sweep tasks.
//!
//! Each periodic concern is an independent task: the lock-expiry sweep, the
//! reassignment-detection tick, and the facade's lightweight heartbeat
//! sweep. Tasks run until the shared shutdown signal flips and return their
//! metrics on exit.

use crate::registry::AgentRegistry;
use cadre_assignment::AssignmentEngine;
use cadre_core::{
    AlertKind, CadreError, CadreResult, CoordinationError, CoordinationEvent, EventBus,
    HealthAlert,
};
use cadre_files::FileAccessCoordinator;
use cadre_scheduler::TaskScheduler;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// METRICS
// ============================================================================

/// Counters for the lock-expiry and heartbeat sweeps.
#[derive(Debug, Default)]
pub struct SweepMetrics {
    /// Locks released by expiry since startup
    pub locks_expired: AtomicU64,
    /// Agents flagged stale by the heartbeat sweep since startup
    pub agents_flagged: AtomicU64,
    /// Sweep cycles completed
    pub cycles: AtomicU64,
    /// Errors encountered
    pub errors: AtomicU64,
}

impl SweepMetrics {
    /// Current snapshot of all counters.
    pub fn snapshot(&self) -> SweepSnapshot {
        SweepSnapshot {
            locks_expired: self.locks_expired.load(Ordering::Relaxed),
            agents_flagged: self.agents_flagged.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of sweep counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSnapshot {
    pub locks_expired: u64,
    pub agents_flagged: u64,
    pub cycles: u64,
    pub errors: u64,
}

/// Counters for the reassignment tick.
#[derive(Debug, Default)]
pub struct ReassignMetrics {
    /// Triggers detected since startup
    pub triggers_detected: u64,
    /// Tasks successfully moved to another agent
    pub tasks_reassigned: u64,
    /// Tick cycles completed
    pub cycles: u64,
}

/// Point-in-time copy of reassignment counters.
pub type ReassignSnapshot = ReassignMetrics;

// ============================================================================
// TASKS
// ============================================================================

/// Periodically release expired file locks.
pub async fn lock_sweep_task(
    files: Arc<FileAccessCoordinator>,
    sweep_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<SweepMetrics> {
    let metrics = Arc::new(SweepMetrics::default());
    let mut ticker = interval(sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!(interval_secs = sweep_interval.as_secs(), "lock sweep task started");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("lock sweep task shutting down");
                    break;
                }
            }
            _ = ticker.tick() => {
                metrics.cycles.fetch_add(1, Ordering::Relaxed);
                match files.sweep_expired(Utc::now()) {
                    Ok(released) => {
                        if released > 0 {
                            tracing::debug!(released, "expired locks released");
                        }
                        metrics.locks_expired.fetch_add(released as u64, Ordering::Relaxed);
                    }
                    Err(error) => {
                        tracing::error!(%error, "lock sweep failed");
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }
    metrics
}

/// Periodically scan live executions for reassignment conditions and move
/// work off failing or overrun agents.
pub async fn reassignment_task(
    scheduler: Arc<RwLock<TaskScheduler>>,
    engine: Arc<RwLock<AssignmentEngine>>,
    registry: Arc<AgentRegistry>,
    tick: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> ReassignMetrics {
    let mut metrics = ReassignMetrics::default();
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!(interval_secs = tick.as_secs(), "reassignment task started");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("reassignment task shutting down");
                    break;
                }
            }
            _ = ticker.tick() => {
                metrics.cycles += 1;
                if let Err(error) = reassignment_pass(&scheduler, &engine, &registry, &mut metrics) {
                    tracing::error!(%error, "reassignment pass failed");
                }
            }
        }
    }
    metrics
}

fn reassignment_pass(
    scheduler: &Arc<RwLock<TaskScheduler>>,
    engine: &Arc<RwLock<AssignmentEngine>>,
    registry: &Arc<AgentRegistry>,
    metrics: &mut ReassignMetrics,
) -> CadreResult<()> {
    let tasks = scheduler
        .read()
        .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))?
        .tasks_snapshot();
    let agents = registry.all_map()?;
    let candidates = registry.all()?;

    let triggers = engine
        .read()
        .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))?
        .check_for_reassignment(&tasks, &agents, Utc::now());
    metrics.triggers_detected += triggers.len() as u64;

    for trigger in triggers {
        tracing::warn!(
            task_id = %trigger.task_id,
            agent_id = %trigger.agent_id,
            kind = ?trigger.kind,
            reason = trigger.reason,
            "reassignment trigger"
        );
        let Some(task) = tasks.get(&trigger.task_id) else {
            continue;
        };
        let result = engine
            .write()
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))?
            .reassign_task(task, &candidates);
        if let Some(result) = result {
            scheduler
                .write()
                .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))?
                .reassign_task_to(trigger.task_id, result.agent_id)?;
            metrics.tasks_reassigned += 1;
        }
    }
    Ok(())
}

/// Lightweight legacy health sweep: flag agents whose registry heartbeat has
/// gone stale. No recovery ladder; callers wanting that use the full monitor.
pub async fn simple_sweep_task(
    registry: Arc<AgentRegistry>,
    bus: EventBus,
    sweep_interval: Duration,
    stale_after: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<SweepMetrics> {
    let metrics = Arc::new(SweepMetrics::default());
    let mut ticker = interval(sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!(
        interval_secs = sweep_interval.as_secs(),
        stale_after_secs = stale_after.as_secs(),
        "heartbeat sweep task started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("heartbeat sweep task shutting down");
                    break;
                }
            }
            _ = ticker.tick() => {
                metrics.cycles.fetch_add(1, Ordering::Relaxed);
                let cutoff = chrono::Duration::from_std(stale_after)
                    .unwrap_or_else(|_| chrono::Duration::seconds(120));
                let now = Utc::now();
                match registry.all() {
                    Ok(agents) => {
                        for agent in agents {
                            if now - agent.last_heartbeat > cutoff {
                                metrics.agents_flagged.fetch_add(1, Ordering::Relaxed);
                                bus.publish(CoordinationEvent::HealthAlertRaised {
                                    alert: HealthAlert::new(
                                        agent.agent_id,
                                        AlertKind::AgentDegraded,
                                        "registry heartbeat stale",
                                    ),
                                });
                            }
                        }
                    }
                    Err(error) => {
                        tracing::error!(%error, "heartbeat sweep failed");
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }
    metrics
}

// ============================================================================
// HANDLE BUNDLE
// ============================================================================

/// Join handles plus the shutdown switch for the spawned background tasks.
pub struct BackgroundTasks {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub(crate) fn new(shutdown_tx: watch::Sender<bool>, handles: Vec<JoinHandle<()>>) -> Self {
        Self {
            shutdown_tx,
            handles,
        }
    }

    /// Signal shutdown and wait for every task to finish its current cycle.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cadre_core::{AgentInfo, FileCoordinatorConfig, LockKind};
    use cadre_files::InMemoryFileIo;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_lock_sweep_releases_and_shuts_down() {
        let bus = EventBus::new(64);
        let files = Arc::new(FileAccessCoordinator::new(
            Arc::new(InMemoryFileIo::new()),
            FileCoordinatorConfig {
                default_lock_ttl: Duration::from_millis(10),
                ..FileCoordinatorConfig::default()
            },
            bus,
        ));
        files
            .request_lock("swept.rs", Uuid::now_v7(), LockKind::Write)
            .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(lock_sweep_task(
            files.clone(),
            Duration::from_millis(30),
            shutdown_rx,
        ));

        // Past the TTL and at least one sweep tick.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(files.active_locks("swept.rs").unwrap().is_empty());

        shutdown_tx.send(true).unwrap();
        let metrics = handle.await.unwrap();
        assert!(metrics.snapshot().locks_expired >= 1);
        assert!(metrics.snapshot().cycles >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simple_sweep_flags_stale_heartbeats() {
        let bus = EventBus::new(64);
        let registry = Arc::new(AgentRegistry::new());
        let mut stale = AgentInfo::new("backend", vec![]);
        stale.last_heartbeat = Utc::now() - chrono::Duration::seconds(600);
        let stale_id = stale.agent_id;
        registry.register(stale).unwrap();
        registry.register(AgentInfo::new("docs", vec![])).unwrap();

        let mut rx = bus.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(simple_sweep_task(
            registry,
            bus,
            Duration::from_secs(60),
            Duration::from_secs(120),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown_tx.send(true).unwrap();
        let metrics = handle.await.unwrap();
        assert_eq!(metrics.snapshot().agents_flagged, 1);

        match rx.try_recv().unwrap() {
            CoordinationEvent::HealthAlertRaised { alert } => {
                assert_eq!(alert.agent_id, stale_id);
                assert_eq!(alert.kind, AlertKind::AgentDegraded);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
