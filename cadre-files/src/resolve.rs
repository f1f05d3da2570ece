//! Conflict resolution strategies.
//!
//! Strategies are tried in priority order; each declares whether it can
//! resolve a given conflict. Merge handles disjoint line-level edits against
//! the last common snapshot; overwrite is the always-resolvable last-writer
//! fallback; manual and abort never auto-resolve.

use cadre_core::{
    AgentId, Conflict, ConflictResolution, FileSnapshot, ResolutionKind, Timestamp,
};

/// Snapshot history a strategy may consult, oldest first.
pub struct ResolutionContext<'a> {
    pub snapshots: &'a [FileSnapshot],
}

/// One ordered, capability-checked resolution strategy.
pub trait ResolutionStrategy: Send + Sync {
    /// The strategy recorded on resolutions this produces.
    fn kind(&self) -> ResolutionKind;

    /// Whether this strategy can resolve the conflict.
    fn can_resolve(&self, conflict: &Conflict, ctx: &ResolutionContext<'_>) -> bool;

    /// Produce the resolution. Only called after `can_resolve` returns true.
    fn resolve(
        &self,
        conflict: &Conflict,
        ctx: &ResolutionContext<'_>,
    ) -> Option<ConflictResolution>;
}

// ============================================================================
// LINE DIFFS AND THREE-WAY MERGE
// ============================================================================

/// One differing line between two file versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineDiff {
    /// Zero-based line index
    pub line: usize,
    /// Old content (`None` when the line was added)
    pub old: Option<String>,
    /// New content (`None` when the line was removed)
    pub new: Option<String>,
}

/// Line-by-line diff of two versions.
pub fn diff_lines(old: &str, new: &str) -> Vec<LineDiff> {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let mut diffs = Vec::new();
    for i in 0..old_lines.len().max(new_lines.len()) {
        let old_line = old_lines.get(i);
        let new_line = new_lines.get(i);
        if old_line != new_line {
            diffs.push(LineDiff {
                line: i,
                old: old_line.map(|s| s.to_string()),
                new: new_line.map(|s| s.to_string()),
            });
        }
    }
    diffs
}

/// Line-level three-way merge. Succeeds only when the two sides changed
/// disjoint line sets relative to `base`; edits that reshape the file's
/// length on both sides, or touch the same line, are not mergeable.
pub fn merge_lines(base: &str, ours: &str, theirs: &str) -> Option<String> {
    // If one side left the file untouched, the other side's version is the
    // merge.
    if ours == base {
        return Some(theirs.to_string());
    }
    if theirs == base {
        return Some(ours.to_string());
    }

    let base_lines: Vec<&str> = base.lines().collect();
    let our_lines: Vec<&str> = ours.lines().collect();
    let their_lines: Vec<&str> = theirs.lines().collect();

    if our_lines.len() != base_lines.len() || their_lines.len() != base_lines.len() {
        return None;
    }

    let mut merged: Vec<&str> = Vec::with_capacity(base_lines.len());
    for i in 0..base_lines.len() {
        let ours_changed = our_lines[i] != base_lines[i];
        let theirs_changed = their_lines[i] != base_lines[i];
        match (ours_changed, theirs_changed) {
            (true, true) => return None,
            (true, false) => merged.push(our_lines[i]),
            (false, true) => merged.push(their_lines[i]),
            (false, false) => merged.push(base_lines[i]),
        }
    }
    Some(merged.join("\n"))
}

// ============================================================================
// MERGE STRATEGY
// ============================================================================

/// Three-way merge against the last common snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeStrategy;

impl MergeStrategy {
    /// Latest snapshot written by `agent`, if any.
    fn latest_by<'a>(
        snapshots: &'a [FileSnapshot],
        agent: AgentId,
    ) -> Option<&'a FileSnapshot> {
        snapshots.iter().rev().find(|s| s.agent_id == agent)
    }

    /// Last snapshot taken strictly before `cutoff`, regardless of author.
    fn base_before<'a>(
        snapshots: &'a [FileSnapshot],
        cutoff: Timestamp,
    ) -> Option<&'a FileSnapshot> {
        snapshots.iter().rev().find(|s| s.taken_at < cutoff)
    }

    fn merged_content(
        &self,
        conflict: &Conflict,
        ctx: &ResolutionContext<'_>,
    ) -> Option<String> {
        let [agent_a, agent_b] = conflict.agents.as_slice() else {
            return None;
        };
        let ours = Self::latest_by(ctx.snapshots, *agent_a)?;
        let theirs = Self::latest_by(ctx.snapshots, *agent_b)?;
        let earliest = ours.taken_at.min(theirs.taken_at);
        let base = Self::base_before(ctx.snapshots, earliest)?;
        merge_lines(&base.content, &ours.content, &theirs.content)
    }
}

impl ResolutionStrategy for MergeStrategy {
    fn kind(&self) -> ResolutionKind {
        ResolutionKind::Merge
    }

    fn can_resolve(&self, conflict: &Conflict, ctx: &ResolutionContext<'_>) -> bool {
        self.merged_content(conflict, ctx).is_some()
    }

    fn resolve(
        &self,
        conflict: &Conflict,
        ctx: &ResolutionContext<'_>,
    ) -> Option<ConflictResolution> {
        let merged = self.merged_content(conflict, ctx)?;
        Some(
            ConflictResolution::automatic(
                ResolutionKind::Merge,
                "disjoint line regions merged against last common snapshot",
            )
            .with_merged_content(merged),
        )
    }
}

// ============================================================================
// OVERWRITE STRATEGY
// ============================================================================

/// Last-writer-wins; always resolvable, used as the fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverwriteStrategy;

impl ResolutionStrategy for OverwriteStrategy {
    fn kind(&self) -> ResolutionKind {
        ResolutionKind::Overwrite
    }

    fn can_resolve(&self, _conflict: &Conflict, _ctx: &ResolutionContext<'_>) -> bool {
        true
    }

    fn resolve(
        &self,
        _conflict: &Conflict,
        ctx: &ResolutionContext<'_>,
    ) -> Option<ConflictResolution> {
        let resolution =
            ConflictResolution::automatic(ResolutionKind::Overwrite, "last writer wins");
        Some(match ctx.snapshots.last() {
            Some(latest) => resolution.with_merged_content(latest.content.clone()),
            None => resolution,
        })
    }
}

// ============================================================================
// MANUAL AND ABORT
// ============================================================================

/// Requires an explicit human or supervising-agent decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualStrategy;

impl ResolutionStrategy for ManualStrategy {
    fn kind(&self) -> ResolutionKind {
        ResolutionKind::Manual
    }

    fn can_resolve(&self, _conflict: &Conflict, _ctx: &ResolutionContext<'_>) -> bool {
        false
    }

    fn resolve(
        &self,
        _conflict: &Conflict,
        _ctx: &ResolutionContext<'_>,
    ) -> Option<ConflictResolution> {
        None
    }
}

/// Discards both changes; requires an explicit decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortStrategy;

impl ResolutionStrategy for AbortStrategy {
    fn kind(&self) -> ResolutionKind {
        ResolutionKind::Abort
    }

    fn can_resolve(&self, _conflict: &Conflict, _ctx: &ResolutionContext<'_>) -> bool {
        false
    }

    fn resolve(
        &self,
        _conflict: &Conflict,
        _ctx: &ResolutionContext<'_>,
    ) -> Option<ConflictResolution> {
        None
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cadre_core::ConflictKind;
    use uuid::Uuid;

    const BASE: &str = "line one\nline two\nline three\nline four";

    #[test]
    fn test_merge_disjoint_edits() {
        let ours = "EDITED one\nline two\nline three\nline four";
        let theirs = "line one\nline two\nline three\nEDITED four";
        let merged = merge_lines(BASE, ours, theirs).unwrap();
        assert_eq!(merged, "EDITED one\nline two\nline three\nEDITED four");
    }

    #[test]
    fn test_merge_overlapping_edits_declines() {
        let ours = "EDITED one\nline two\nline three\nline four";
        let theirs = "DIFFERENT one\nline two\nline three\nline four";
        assert!(merge_lines(BASE, ours, theirs).is_none());
    }

    #[test]
    fn test_merge_length_change_declines() {
        let ours = "line one\nline two";
        let theirs = "line one\nline two\nline three\nEDITED four";
        assert!(merge_lines(BASE, ours, theirs).is_none());
    }

    #[test]
    fn test_merge_untouched_side_takes_other() {
        let theirs = "line one\nline two\nline three\nEDITED four";
        assert_eq!(merge_lines(BASE, BASE, theirs).unwrap(), theirs);
    }

    #[test]
    fn test_diff_lines_reports_changes_and_additions() {
        let diffs = diff_lines("a\nb", "a\nB\nc");
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].line, 1);
        assert_eq!(diffs[0].old.as_deref(), Some("b"));
        assert_eq!(diffs[0].new.as_deref(), Some("B"));
        assert_eq!(diffs[1].line, 2);
        assert_eq!(diffs[1].old, None);
        assert_eq!(diffs[1].new.as_deref(), Some("c"));
    }

    fn snapshot_at(path: &str, agent: Uuid, content: &str, offset_ms: i64) -> FileSnapshot {
        let mut snap = FileSnapshot::capture(path, agent, content);
        snap.taken_at += chrono::Duration::milliseconds(offset_ms);
        snap
    }

    #[test]
    fn test_merge_strategy_end_to_end() {
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let base = snapshot_at("f.rs", a, BASE, -100);
        let ours = snapshot_at("f.rs", a, "EDITED one\nline two\nline three\nline four", 0);
        let theirs = snapshot_at("f.rs", b, "line one\nline two\nline three\nEDITED four", 50);
        let snapshots = vec![base, ours, theirs];
        let ctx = ResolutionContext {
            snapshots: &snapshots,
        };
        let conflict = Conflict::new("f.rs", ConflictKind::ConcurrentModification, vec![a, b]);

        assert!(MergeStrategy.can_resolve(&conflict, &ctx));
        let resolution = MergeStrategy.resolve(&conflict, &ctx).unwrap();
        assert_eq!(resolution.strategy, ResolutionKind::Merge);
        assert_eq!(
            resolution.merged_content.as_deref(),
            Some("EDITED one\nline two\nline three\nEDITED four")
        );
    }

    #[test]
    fn test_merge_strategy_declines_overlap() {
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let base = snapshot_at("f.rs", a, BASE, -100);
        let ours = snapshot_at("f.rs", a, "EDITED one\nline two\nline three\nline four", 0);
        let theirs = snapshot_at("f.rs", b, "CLASHING one\nline two\nline three\nline four", 50);
        let snapshots = vec![base, ours, theirs];
        let ctx = ResolutionContext {
            snapshots: &snapshots,
        };
        let conflict = Conflict::new("f.rs", ConflictKind::ConcurrentModification, vec![a, b]);
        assert!(!MergeStrategy.can_resolve(&conflict, &ctx));
    }

    #[test]
    fn test_overwrite_always_resolves_with_latest() {
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let snapshots = vec![
            snapshot_at("f.rs", a, "older", 0),
            snapshot_at("f.rs", b, "newest", 50),
        ];
        let ctx = ResolutionContext {
            snapshots: &snapshots,
        };
        let conflict = Conflict::new("f.rs", ConflictKind::ConcurrentModification, vec![a, b]);

        assert!(OverwriteStrategy.can_resolve(&conflict, &ctx));
        let resolution = OverwriteStrategy.resolve(&conflict, &ctx).unwrap();
        assert_eq!(resolution.strategy, ResolutionKind::Overwrite);
        assert_eq!(resolution.merged_content.as_deref(), Some("newest"));
    }

    #[test]
    fn test_manual_and_abort_never_auto_resolve() {
        let conflict = Conflict::new(
            "f.rs",
            ConflictKind::MergeConflict,
            vec![Uuid::now_v7(), Uuid::now_v7()],
        );
        let ctx = ResolutionContext { snapshots: &[] };
        assert!(!ManualStrategy.can_resolve(&conflict, &ctx));
        assert!(!AbortStrategy.can_resolve(&conflict, &ctx));
    }
}
