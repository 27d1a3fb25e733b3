//! Trace categories used as `tracing` targets.

/// Trace category for spawning and terminating external processes.
pub const PROCESS: &str = "process";
/// Trace category for output normalization and prompt discovery.
pub const NORMALIZE: &str = "normalize";
/// Trace category for staging and snapshot directory management.
pub const WORKSPACE: &str = "workspace";
/// Trace category for the resource-safety check.
pub const SAFETY: &str = "safety";
/// Trace category for test and suite orchestration.
pub const SUITE: &str = "suite";
