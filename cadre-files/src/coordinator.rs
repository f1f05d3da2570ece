//! File access coordinator.
//!
//! Lock manager, conflict detector/resolver, and change tracker behind one
//! interface. Locking is grant-or-reject: there is no queue and no blocking,
//! callers retry. Backend I/O happens only with a lock held.

use crate::detect::{ConcurrentModificationRule, DetectionContext, DetectionRule, LockTimeoutRule};
use crate::io::FileIo;
use crate::resolve::{
    diff_lines, AbortStrategy, LineDiff, ManualStrategy, MergeStrategy, OverwriteStrategy,
    ResolutionContext, ResolutionStrategy,
};
use cadre_core::{
    compute_path_key, AgentId, CadreError, CadreResult, ChangeKind, Conflict, ConflictId,
    ConflictResolution, CoordinationError, CoordinationEvent, EventBus, FileChange,
    FileCoordinatorConfig, FileError, FileLock, FileSnapshot, LockId, LockKind, ResolutionKind,
    Timestamp,
};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

fn read_guard<T>(lock: &RwLock<T>) -> CadreResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))
}

fn write_guard<T>(lock: &RwLock<T>) -> CadreResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))
}

/// Serializes concurrent file access and reconciles conflicting edits.
/// The lock table is keyed by a stable FNV-1a hash of the path.
pub struct FileAccessCoordinator {
    locks: RwLock<HashMap<i64, Vec<FileLock>>>,
    recently_expired: RwLock<HashMap<String, Vec<FileLock>>>,
    history: RwLock<HashMap<String, VecDeque<FileChange>>>,
    snapshots: RwLock<HashMap<String, Vec<FileSnapshot>>>,
    conflicts: RwLock<HashMap<ConflictId, Conflict>>,
    rules: Vec<Box<dyn DetectionRule>>,
    strategies: Vec<Box<dyn ResolutionStrategy>>,
    io: Arc<dyn FileIo>,
    config: FileCoordinatorConfig,
    bus: EventBus,
}

impl FileAccessCoordinator {
    /// Create a coordinator with the built-in rules and strategies.
    pub fn new(io: Arc<dyn FileIo>, config: FileCoordinatorConfig, bus: EventBus) -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
            recently_expired: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
            snapshots: RwLock::new(HashMap::new()),
            conflicts: RwLock::new(HashMap::new()),
            rules: vec![
                Box::new(ConcurrentModificationRule),
                Box::new(LockTimeoutRule),
            ],
            strategies: vec![
                Box::new(MergeStrategy),
                Box::new(OverwriteStrategy),
                Box::new(ManualStrategy),
                Box::new(AbortStrategy),
            ],
            io,
            config,
            bus,
        }
    }

    /// Replace the detection rules (priority order preserved).
    pub fn with_rules(mut self, rules: Vec<Box<dyn DetectionRule>>) -> Self {
        self.rules = rules;
        self
    }

    /// Replace the resolution strategies (priority order preserved).
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn ResolutionStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    // ------------------------------------------------------------------
    // Locking
    // ------------------------------------------------------------------

    /// Request a lock on `path`. Grants immediately when compatible with
    /// every active lock, otherwise rejects; callers must retry. A holder
    /// re-requesting its own lock kind gets the existing lock extended.
    pub fn request_lock(
        &self,
        path: &str,
        agent_id: AgentId,
        kind: LockKind,
    ) -> CadreResult<FileLock> {
        let now = Utc::now();
        self.prune_expired_for(path, now)?;

        let mut locks = write_guard(&self.locks)?;
        let entry = locks.entry(compute_path_key(path)).or_default();

        if let Some(existing) = entry
            .iter_mut()
            .find(|l| l.holder == agent_id && l.kind == kind)
        {
            existing.extend(self.config.default_lock_ttl.as_millis() as i64);
            return Ok(existing.clone());
        }

        // Another holder's incompatible lock rejects the request; the
        // caller's own locks of a different kind do not (upgrades stack).
        if let Some(blocking) = entry
            .iter()
            .find(|l| l.holder != agent_id && !kind.compatible_with(&l.kind))
        {
            return Err(FileError::LockRejected {
                path: path.to_string(),
                holder: blocking.holder,
            }
            .into());
        }

        let lock = FileLock::new(
            path,
            agent_id,
            kind,
            self.config.default_lock_ttl.as_millis() as i64,
        );
        entry.push(lock.clone());
        drop(locks);

        tracing::debug!(path, holder = %agent_id, ?kind, "lock granted");
        self.bus.publish(CoordinationEvent::LockGranted {
            lock_id: lock.lock_id,
            path: path.to_string(),
            holder: agent_id,
            kind,
        });
        Ok(lock)
    }

    /// Release a lock by id. Idempotent: releasing an unknown or already
    /// released lock returns `Ok(false)`.
    pub fn release_lock(&self, lock_id: LockId) -> CadreResult<bool> {
        let removed = {
            let mut locks = write_guard(&self.locks)?;
            let mut removed = None;
            for entry in locks.values_mut() {
                if let Some(pos) = entry.iter().position(|l| l.lock_id == lock_id) {
                    removed = Some(entry.remove(pos));
                    break;
                }
            }
            removed
        };
        match removed {
            Some(lock) => {
                self.bus.publish(CoordinationEvent::LockReleased {
                    lock_id: lock.lock_id,
                    path: lock.path,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Release every expired lock, remembering them briefly for the
    /// lock-timeout detection rule. Returns how many were released.
    pub fn sweep_expired(&self, now: Timestamp) -> CadreResult<usize> {
        let mut released = Vec::new();
        {
            let mut locks = write_guard(&self.locks)?;
            for entry in locks.values_mut() {
                let (expired, live): (Vec<FileLock>, Vec<FileLock>) =
                    entry.drain(..).partition(|l| l.is_expired(now));
                *entry = live;
                released.extend(expired);
            }
        }

        let retention = chrono::Duration::from_std(self.config.conflict_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(5));
        let mut remembered = write_guard(&self.recently_expired)?;
        for lock in &released {
            remembered
                .entry(lock.path.clone())
                .or_default()
                .push(lock.clone());
        }
        for entry in remembered.values_mut() {
            entry.retain(|l| l.expires_at.is_some_and(|exp| now - exp < retention));
        }
        drop(remembered);

        for lock in &released {
            self.bus.publish(CoordinationEvent::LockExpired {
                lock_id: lock.lock_id,
                path: lock.path.clone(),
                holder: lock.holder,
            });
        }
        Ok(released.len())
    }

    /// Active (unexpired) locks on a path.
    pub fn active_locks(&self, path: &str) -> CadreResult<Vec<FileLock>> {
        let now = Utc::now();
        Ok(read_guard(&self.locks)?
            .get(&compute_path_key(path))
            .map(|entry| {
                entry
                    .iter()
                    .filter(|l| !l.is_expired(now))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn prune_expired_for(&self, path: &str, now: Timestamp) -> CadreResult<()> {
        let mut expired = Vec::new();
        {
            let mut locks = write_guard(&self.locks)?;
            if let Some(entry) = locks.get_mut(&compute_path_key(path)) {
                let (gone, live): (Vec<FileLock>, Vec<FileLock>) =
                    entry.drain(..).partition(|l| l.is_expired(now));
                *entry = live;
                expired = gone;
            }
        }
        if !expired.is_empty() {
            let mut remembered = write_guard(&self.recently_expired)?;
            let slot = remembered.entry(path.to_string()).or_default();
            for lock in &expired {
                slot.push(lock.clone());
            }
            drop(remembered);
            for lock in expired {
                self.bus.publish(CoordinationEvent::LockExpired {
                    lock_id: lock.lock_id,
                    path: path.to_string(),
                    holder: lock.holder,
                });
            }
        }
        Ok(())
    }

    fn require_lock(&self, path: &str, agent_id: AgentId, writable: bool) -> CadreResult<()> {
        let held = self.active_locks(path)?.into_iter().any(|l| {
            l.holder == agent_id && (!writable || l.kind.is_exclusive())
        });
        if held {
            Ok(())
        } else {
            Err(FileError::LockNotHeld {
                path: path.to_string(),
                agent_id,
                required: if writable { "write" } else { "read" }.to_string(),
            }
            .into())
        }
    }

    // ------------------------------------------------------------------
    // Locked I/O
    // ------------------------------------------------------------------

    /// Read a file under a held lock of any kind.
    pub async fn read(&self, path: &str, agent_id: AgentId) -> CadreResult<String> {
        self.require_lock(path, agent_id, false)?;
        self.io.read_file(path).await
    }

    /// Write a file under a held write/exclusive lock, recording the change
    /// and snapshotting large content for later conflict analysis.
    pub async fn write(&self, path: &str, agent_id: AgentId, content: &str) -> CadreResult<()> {
        self.require_lock(path, agent_id, true)?;
        let existed = self.io.exists(path).await?;
        self.io.write_file(path, content).await?;

        let kind = if existed {
            ChangeKind::Modify
        } else {
            ChangeKind::Create
        };
        self.record_change(FileChange::new(path, agent_id, kind), Some(content))?;
        Ok(())
    }

    /// Delete a file under a held write/exclusive lock.
    pub async fn delete(&self, path: &str, agent_id: AgentId) -> CadreResult<()> {
        self.require_lock(path, agent_id, true)?;
        self.io.delete_file(path).await?;
        self.record_change(FileChange::new(path, agent_id, ChangeKind::Delete), None)?;
        Ok(())
    }

    /// Move a file under a held write/exclusive lock on the source path.
    pub async fn move_file(&self, from: &str, to: &str, agent_id: AgentId) -> CadreResult<()> {
        self.require_lock(from, agent_id, true)?;
        self.io.move_file(from, to).await?;
        self.record_change(
            FileChange::new(
                to,
                agent_id,
                ChangeKind::Move {
                    from: from.to_string(),
                },
            ),
            None,
        )?;
        Ok(())
    }

    /// List directory entries (no lock required; listing mutates nothing).
    pub async fn list_directory(&self, path: &str) -> CadreResult<Vec<String>> {
        self.io.list_directory(path).await
    }

    // ------------------------------------------------------------------
    // Change tracking and detection
    // ------------------------------------------------------------------

    fn record_change(&self, change: FileChange, content: Option<&str>) -> CadreResult<()> {
        let path = change.path.clone();
        {
            let mut history = write_guard(&self.history)?;
            let entry = history.entry(path.clone()).or_default();
            entry.push_back(change.clone());
            while entry.len() > self.config.history_cap {
                entry.pop_front();
            }
        }

        if let Some(content) = content {
            if content.len() >= self.config.snapshot_threshold {
                let snapshot = FileSnapshot::capture(&path, change.agent_id, content);
                write_guard(&self.snapshots)?
                    .entry(path.clone())
                    .or_default()
                    .push(snapshot);
            }
        }

        let detected = {
            let history = read_guard(&self.history)?;
            let expired = read_guard(&self.recently_expired)?;
            let full: Vec<FileChange> = history
                .get(&path)
                .map(|h| h.iter().cloned().collect())
                .unwrap_or_default();
            let expired_locks = expired.get(&path).cloned().unwrap_or_default();
            let window = chrono::Duration::from_std(self.config.conflict_window)
                .unwrap_or_else(|_| chrono::Duration::seconds(5));
            let ctx = DetectionContext {
                history: &full,
                newest: &change,
                recently_expired: &expired_locks,
                window,
            };
            self.rules.iter().find_map(|rule| {
                rule.detect(&ctx)
                    .map(|conflict| (rule.name(), conflict))
            })
        };

        if let Some((rule_name, conflict)) = detected {
            tracing::warn!(path, rule = rule_name, kind = ?conflict.kind, "conflict detected");
            self.bus.publish(CoordinationEvent::ConflictDetected {
                conflict_id: conflict.conflict_id,
                path: conflict.path.clone(),
                kind: conflict.kind,
            });
            write_guard(&self.conflicts)?.insert(conflict.conflict_id, conflict);
        }
        Ok(())
    }

    /// Change history for a path, oldest first.
    pub fn history_of(&self, path: &str) -> CadreResult<Vec<FileChange>> {
        Ok(read_guard(&self.history)?
            .get(path)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Content snapshots for a path, oldest first.
    pub fn snapshots_of(&self, path: &str) -> CadreResult<Vec<FileSnapshot>> {
        Ok(read_guard(&self.snapshots)?
            .get(path)
            .cloned()
            .unwrap_or_default())
    }

    /// Line-level diff between the last two snapshots of a path.
    pub fn analyze_file_conflicts(&self, path: &str) -> CadreResult<Vec<LineDiff>> {
        let snapshots = self.snapshots_of(path)?;
        Ok(match snapshots.as_slice() {
            [.., previous, latest] => diff_lines(&previous.content, &latest.content),
            _ => Vec::new(),
        })
    }

    // ------------------------------------------------------------------
    // Conflicts
    // ------------------------------------------------------------------

    /// A conflict by id.
    pub fn conflict(&self, conflict_id: ConflictId) -> CadreResult<Option<Conflict>> {
        Ok(read_guard(&self.conflicts)?.get(&conflict_id).cloned())
    }

    /// Conflicts recorded for a path.
    pub fn conflicts_for(&self, path: &str) -> CadreResult<Vec<Conflict>> {
        Ok(read_guard(&self.conflicts)?
            .values()
            .filter(|c| c.path == path)
            .cloned()
            .collect())
    }

    /// All conflicts not yet resolved.
    pub fn unresolved_conflicts(&self) -> CadreResult<Vec<Conflict>> {
        Ok(read_guard(&self.conflicts)?
            .values()
            .filter(|c| !c.resolved)
            .cloned()
            .collect())
    }

    /// Try resolution strategies in priority order; record and return the
    /// first that succeeds, or `None` when only manual intervention remains.
    pub fn auto_resolve_conflict(
        &self,
        conflict_id: ConflictId,
    ) -> CadreResult<Option<ConflictResolution>> {
        let conflict = self
            .conflict(conflict_id)?
            .ok_or(FileError::ConflictNotFound { conflict_id })?;
        if conflict.resolved {
            return Ok(conflict.resolution);
        }

        let snapshots = self.snapshots_of(&conflict.path)?;
        let ctx = ResolutionContext {
            snapshots: &snapshots,
        };
        let resolution = self
            .strategies
            .iter()
            .filter(|s| s.can_resolve(&conflict, &ctx))
            .find_map(|s| s.resolve(&conflict, &ctx));

        if let Some(resolution) = resolution {
            self.finish_resolution(conflict_id, &conflict.path, resolution.clone())?;
            Ok(Some(resolution))
        } else {
            Ok(None)
        }
    }

    /// Record an explicit manual/abort decision for a conflict.
    pub fn resolve_manually(
        &self,
        conflict_id: ConflictId,
        strategy: ResolutionKind,
        resolved_by: AgentId,
        note: &str,
    ) -> CadreResult<ConflictResolution> {
        let conflict = self
            .conflict(conflict_id)?
            .ok_or(FileError::ConflictNotFound { conflict_id })?;
        let resolution = ConflictResolution {
            strategy,
            resolved_by: resolved_by.to_string(),
            merged_content: None,
            note: note.to_string(),
            resolved_at: Utc::now(),
        };
        self.finish_resolution(conflict_id, &conflict.path, resolution.clone())?;
        Ok(resolution)
    }

    fn finish_resolution(
        &self,
        conflict_id: ConflictId,
        path: &str,
        resolution: ConflictResolution,
    ) -> CadreResult<()> {
        let strategy = resolution.strategy;
        {
            let mut conflicts = write_guard(&self.conflicts)?;
            if let Some(stored) = conflicts.get_mut(&conflict_id) {
                stored.resolve(resolution);
            }
        }
        self.bus.publish(CoordinationEvent::ConflictResolved {
            conflict_id,
            path: path.to_string(),
            strategy,
        });
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
