//! Logical file locks.
//!
//! Locks are advisory reservations on workspace file paths, not OS-level
//! locks. At most one write-or-exclusive lock may be active per path; any
//! number of read locks may coexist.

use crate::{AgentId, DurationMs, LockId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// LOCK KIND
// ============================================================================

/// Access level a lock reserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    /// Shared read access; compatible with other read locks
    Read,
    /// Single-writer access; excludes every other lock
    Write,
    /// Single-holder access for destructive operations (delete/move)
    Exclusive,
}

impl LockKind {
    /// Whether two locks of these kinds may be held on the same path at once.
    /// Only read/read is compatible.
    pub const fn compatible_with(&self, other: &LockKind) -> bool {
        matches!((self, other), (LockKind::Read, LockKind::Read))
    }

    /// Whether this kind excludes all other holders.
    pub const fn is_exclusive(&self) -> bool {
        !matches!(self, LockKind::Read)
    }
}

// ============================================================================
// FILE LOCK
// ============================================================================

/// An active reservation on a file path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileLock {
    /// Unique identifier for this lock
    pub lock_id: LockId,
    /// Workspace-relative path being locked
    pub path: String,
    /// Agent holding the lock
    pub holder: AgentId,
    /// Access level reserved
    pub kind: LockKind,
    /// When the lock was granted
    pub acquired_at: Timestamp,
    /// When the lock lapses; `None` means it is held until released
    pub expires_at: Option<Timestamp>,
}

impl FileLock {
    /// Create a new lock with a millisecond TTL.
    pub fn new(path: &str, holder: AgentId, kind: LockKind, ttl_ms: DurationMs) -> Self {
        let now = Utc::now();
        Self {
            lock_id: Uuid::now_v7(),
            path: path.to_string(),
            holder,
            kind,
            acquired_at: now,
            expires_at: Some(now + chrono::Duration::milliseconds(ttl_ms)),
        }
    }

    /// Create a lock with no expiry.
    pub fn unexpiring(path: &str, holder: AgentId, kind: LockKind) -> Self {
        Self {
            lock_id: Uuid::now_v7(),
            path: path.to_string(),
            holder,
            kind,
            acquired_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Check if the lock has lapsed at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// Push the expiry out by `additional_ms`.
    pub fn extend(&mut self, additional_ms: DurationMs) {
        if let Some(exp) = self.expires_at {
            self.expires_at = Some(exp + chrono::Duration::milliseconds(additional_ms));
        }
    }

    /// Stable table key for this lock's path.
    pub fn path_key(&self) -> i64 {
        compute_path_key(&self.path)
    }
}

/// Compute a stable i64 key for a file path using FNV-1a hash.
/// FNV-1a is deterministic across Rust versions and compilations.
pub fn compute_path_key(path: &str) -> i64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET_BASIS;
    for byte in path.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash as i64
}

// ============================================================================
// TESTS
// ============================================================================
