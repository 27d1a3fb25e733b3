//! Differential-execution engine for shell compatibility testing.
//!
//! This crate runs the same command line through two shells (a *candidate* under test and a
//! trusted *reference*), captures what each of them observably does, and decides pass/fail by
//! structural comparison of:
//!
//! 1. **Output**: stdout of both shells after [normalization](normalize::normalize), which
//!    strips terminal escape sequences and the candidate's interactive prompt echo.
//! 2. **Exit status**: including a distinct sentinel for runs that hit their deadline.
//! 3. **Filesystem side effects**: files written into a shared staging directory, snapshotted
//!    separately for each shell.
//! 4. **Resource safety** (optional): leaked memory or unclosed descriptors reported by an
//!    instrumented run of the candidate.
//!
//! Test cases execute strictly one at a time, since both shells share the staging directory.

mod config;
mod error;
mod executor;
mod fsdiff;
mod process;
mod prompt;
mod safety;
mod suite;
mod testcase;
mod workspace;

pub mod fixtures;
pub mod loader;
pub mod normalize;
pub mod reporting;
pub mod trace_categories;
pub mod util;

pub use config::{
    DEFAULT_GRACE_PERIOD, DEFAULT_SAFETY_TIMEOUT, DEFAULT_TIMEOUT, RunnerConfig, SafetyConfig,
    ShellConfig, ShellRole,
};
pub use error::Error;
pub use executor::{Mismatch, ShellRun, TestExecutor, TestResult};
pub use fsdiff::{DirComparison, DirComparisonEntry, diff_dirs};
pub use process::{ExitOutcome, OutputCapture, ProcessRunner, RunOutcome};
pub use prompt::{FALLBACK_PROMPT, discover_prompt};
pub use safety::{
    LEAK_MARKERS, SafetyChecker, SafetyReport, UNCLOSED_FD_MARKER, classify_diagnostics,
};
pub use suite::{NoopObserver, SuiteObserver, SuiteResults, SuiteRunner, Tally};
pub use testcase::{TestCase, TestCategory};
pub use workspace::{SnapshotSide, Workspace};
