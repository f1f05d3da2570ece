//! File change tracking and conflict records.
//!
//! Every write/delete/move is appended to a bounded per-file change history.
//! Detection rules inspect that history and may emit a `Conflict`; a conflict
//! is terminated by exactly one `ConflictResolution`.

use crate::{AgentId, ConflictId, ContentHash, EntityId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// CHANGE HISTORY
// ============================================================================

/// Kind of mutation applied to a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
    /// File moved from another path
    Move {
        from: String,
    },
}

/// One entry in a file's append-only change history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    /// Unique identifier for this change
    pub change_id: EntityId,
    /// Path the change applied to
    pub path: String,
    /// Agent that made the change
    pub agent_id: AgentId,
    /// What kind of change it was
    pub kind: ChangeKind,
    /// When the change landed
    pub changed_at: Timestamp,
}

impl FileChange {
    /// Record a change made now.
    pub fn new(path: &str, agent_id: AgentId, kind: ChangeKind) -> Self {
        Self {
            change_id: Uuid::now_v7(),
            path: path.to_string(),
            agent_id,
            kind,
            changed_at: Utc::now(),
        }
    }
}

/// Periodic content snapshot used for line-level diffing and merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSnapshot {
    /// Unique identifier for this snapshot
    pub snapshot_id: EntityId,
    /// Path the snapshot captures
    pub path: String,
    /// Agent whose write produced this snapshot
    pub agent_id: AgentId,
    /// Full file content at capture time
    pub content: String,
    /// SHA-256 hash of the content
    pub content_hash: ContentHash,
    /// When the snapshot was taken
    pub taken_at: Timestamp,
}

impl FileSnapshot {
    /// Capture a snapshot of `content` as written by `agent_id`.
    pub fn capture(path: &str, agent_id: AgentId, content: &str) -> Self {
        Self {
            snapshot_id: Uuid::now_v7(),
            path: path.to_string(),
            agent_id,
            content: content.to_string(),
            content_hash: crate::compute_content_hash(content.as_bytes()),
            taken_at: Utc::now(),
        }
    }
}

// ============================================================================
// CONFLICTS
// ============================================================================

/// What kind of incompatibility was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Two agents changed the same file within the detection window
    ConcurrentModification,
    /// A change landed after the holder's lock had already expired
    LockTimeout,
    /// Overlapping edits that a merge could not reconcile
    MergeConflict,
}

/// Strategy recorded on a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    /// Line-level three-way merge of disjoint regions
    Merge,
    /// Last-writer-wins
    Overwrite,
    /// Deferred to a human or supervising agent
    Manual,
    /// Both changes discarded
    Abort,
}

/// How a conflict was terminated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    /// Strategy that resolved the conflict
    pub strategy: ResolutionKind,
    /// "automatic" or the resolving agent's id
    pub resolved_by: String,
    /// Merged content, when the merge strategy produced one
    pub merged_content: Option<String>,
    /// Short explanation of the outcome
    pub note: String,
    /// When the resolution was recorded
    pub resolved_at: Timestamp,
}

impl ConflictResolution {
    /// Create an automatic resolution record.
    pub fn automatic(strategy: ResolutionKind, note: &str) -> Self {
        Self {
            strategy,
            resolved_by: "automatic".to_string(),
            merged_content: None,
            note: note.to_string(),
            resolved_at: Utc::now(),
        }
    }

    /// Attach merged content.
    pub fn with_merged_content(mut self, content: String) -> Self {
        self.merged_content = Some(content);
        self
    }
}

/// A detected incompatibility between agents' changes to one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Unique identifier for this conflict
    pub conflict_id: ConflictId,
    /// Path the conflict concerns
    pub path: String,
    /// Kind of conflict
    pub kind: ConflictKind,
    /// Agents involved
    pub agents: Vec<AgentId>,
    /// When the conflict was detected
    pub detected_at: Timestamp,
    /// Whether a resolution has been recorded
    pub resolved: bool,
    /// The resolution, once recorded
    pub resolution: Option<ConflictResolution>,
}

impl Conflict {
    /// Create a new unresolved conflict.
    pub fn new(path: &str, kind: ConflictKind, agents: Vec<AgentId>) -> Self {
        Self {
            conflict_id: Uuid::now_v7(),
            path: path.to_string(),
            kind,
            agents,
            detected_at: Utc::now(),
            resolved: false,
            resolution: None,
        }
    }

    /// Record the resolution that terminates this conflict.
    pub fn resolve(&mut self, resolution: ConflictResolution) {
        self.resolved = true;
        self.resolution = Some(resolution);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_hashes_content() {
        let agent = Uuid::now_v7();
        let snap = FileSnapshot::capture("src/auth.rs", agent, "pub fn login() {}");
        assert_eq!(
            snap.content_hash,
            crate::compute_content_hash(b"pub fn login() {}")
        );
    }

    #[test]
    fn test_conflict_resolution_lifecycle() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        let mut conflict = Conflict::new(
            "src/routes.rs",
            ConflictKind::ConcurrentModification,
            vec![a, b],
        );
        assert!(!conflict.resolved);

        conflict.resolve(ConflictResolution::automatic(
            ResolutionKind::Overwrite,
            "last writer wins",
        ));
        assert!(conflict.resolved);
        assert_eq!(
            conflict.resolution.as_ref().unwrap().strategy,
            ResolutionKind::Overwrite
        );
    }

    #[test]
    fn test_move_change_carries_origin() {
        let change = FileChange::new(
            "src/new_name.rs",
            Uuid::now_v7(),
            ChangeKind::Move {
                from: "src/old_name.rs".to_string(),
            },
        );
        match change.kind {
            ChangeKind::Move { ref from } => assert_eq!(from, "src/old_name.rs"),
            _ => panic!("expected move"),
        }
    }
}
