//! CADRE Graph - Dependency Tracking and Queuing
//!
//! The dependency graph keeps the task-to-task "depends on" relation acyclic
//! at every point in time: edges that would close a cycle are rejected at
//! insertion, not discovered later. The task queue keeps one deterministic,
//! priority-ordered line of work per agent.

pub mod graph;
pub mod queue;

pub use graph::DependencyGraph;
pub use queue::TaskQueue;
