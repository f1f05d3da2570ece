//! CADRE Health - Failure Detection and Recovery
//!
//! One periodic liveness check per registered agent, hysteresis so a single
//! transient failure does not flap the healthy flag, and an escalating
//! recovery ladder (reset, restart, isolate, escalate, replace) whose every
//! attempt is recorded. Exhausting the ladder raises a distinct alert
//! instead of looping.

pub mod monitor;
pub mod probe;

pub use monitor::{HealthMonitor, MonitorMetrics, MonitorSnapshot};
pub use probe::{AgentProbe, NoopRecoveryHandler, RecoveryHandler};
