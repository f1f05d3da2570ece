//! CADRE Scheduler - Strategy and Task Placement
//!
//! The scheduling strategy is a pure decision function: given a task and a
//! set of agent snapshots, pick an agent or decline. The task scheduler owns
//! the per-agent queues and the dependency graph, applies the strategy, and
//! rebalances queues when the agent pool changes.

pub mod scheduler;
pub mod strategy;

pub use scheduler::{ScheduleOutcome, TaskScheduler};
pub use strategy::{BalancedStrategy, SchedulingStrategy};
