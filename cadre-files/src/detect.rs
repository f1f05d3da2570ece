//! Conflict detection rules.
//!
//! Rules inspect a file's change history whenever a new change lands. Each
//! rule sees (full history, newest change) plus the locks that recently
//! lapsed on the path, and may emit a conflict. Rules run in priority order;
//! the first to fire wins for that change.

use cadre_core::{Conflict, ConflictKind, FileChange, FileLock};

/// What a rule gets to look at for one new change.
pub struct DetectionContext<'a> {
    /// Full change history for the path, oldest first, newest last
    pub history: &'a [FileChange],
    /// The change that just landed
    pub newest: &'a FileChange,
    /// Locks on this path that expired within the detection window
    pub recently_expired: &'a [FileLock],
    /// Concurrency window
    pub window: chrono::Duration,
}

/// One prioritized detection rule.
pub trait DetectionRule: Send + Sync {
    /// Rule name, for logs and conflict notes.
    fn name(&self) -> &'static str;

    /// Inspect the context and emit a conflict if one is present.
    fn detect(&self, ctx: &DetectionContext<'_>) -> Option<Conflict>;
}

// ============================================================================
// CONCURRENT MODIFICATION
// ============================================================================

/// Flags two different agents changing the same file within the window.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcurrentModificationRule;

impl DetectionRule for ConcurrentModificationRule {
    fn name(&self) -> &'static str {
        "concurrent_modification"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Option<Conflict> {
        let newest = ctx.newest;
        let cutoff = newest.changed_at - ctx.window;
        // Walk backwards past the newest change looking for another agent's
        // change inside the window. A change by the same agent in between
        // means the second writer already saw the first write (an ordering
        // exists), so the scan stops there.
        for change in ctx
            .history
            .iter()
            .rev()
            .filter(|c| c.change_id != newest.change_id)
        {
            if change.changed_at < cutoff {
                break;
            }
            if change.agent_id == newest.agent_id {
                break;
            }
            return Some(Conflict::new(
                &newest.path,
                ConflictKind::ConcurrentModification,
                vec![change.agent_id, newest.agent_id],
            ));
        }
        None
    }
}

// ============================================================================
// LOCK TIMEOUT
// ============================================================================

/// Flags a change that landed after another agent's lock on the path expired
/// while that agent's operation was logically still in flight.
#[derive(Debug, Clone, Copy, Default)]
pub struct LockTimeoutRule;

impl DetectionRule for LockTimeoutRule {
    fn name(&self) -> &'static str {
        "lock_timeout"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Option<Conflict> {
        let newest = ctx.newest;
        ctx.recently_expired
            .iter()
            .find(|lock| {
                lock.holder != newest.agent_id
                    && lock
                        .expires_at
                        .is_some_and(|exp| newest.changed_at >= exp)
            })
            .map(|lock| {
                Conflict::new(
                    &newest.path,
                    ConflictKind::LockTimeout,
                    vec![lock.holder, newest.agent_id],
                )
            })
    }
}

// ============================================================================
// TESTS
// ============================================================================
