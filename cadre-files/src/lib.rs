//! CADRE Files - Coordinated Workspace Access
//!
//! Serializes concurrent file access behind logical locks and reconciles the
//! conflicting edits that slip through anyway. Three responsibilities behind
//! one interface: lock management (grant-or-reject, expiry sweep), conflict
//! detection (prioritized rules over per-file change history), and conflict
//! resolution (ordered, capability-checked strategies).

pub mod coordinator;
pub mod detect;
pub mod io;
pub mod resolve;

pub use coordinator::FileAccessCoordinator;
pub use detect::{ConcurrentModificationRule, DetectionContext, DetectionRule, LockTimeoutRule};
pub use io::{FileIo, InMemoryFileIo};
pub use resolve::{
    diff_lines, merge_lines, AbortStrategy, LineDiff, ManualStrategy, MergeStrategy,
    OverwriteStrategy, ResolutionContext, ResolutionStrategy,
};
