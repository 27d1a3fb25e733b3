//! Resource-safety checking through an instrumented run of the candidate shell.

use std::path::Path;

use crate::{
    Error, OutputCapture, ProcessRunner, SafetyConfig, ShellConfig, trace_categories, util,
};

/// Phrases whose presence in the diagnostics indicates leaked memory.
pub const LEAK_MARKERS: [&str; 4] = [
    "definitely lost",
    "indirectly lost",
    "possibly lost",
    "still reachable",
];

/// Phrase whose presence in the diagnostics indicates descriptors left open at exit.
pub const UNCLOSED_FD_MARKER: &str = "file descriptors are left open";

/// Resource-safety defects found in an instrumented run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SafetyReport {
    /// Memory was leaked.
    pub leak: bool,
    /// File descriptors were left open at exit.
    pub unclosed_fd: bool,
}

impl SafetyReport {
    /// Returns whether any defect was found.
    pub const fn has_issues(&self) -> bool {
        self.leak || self.unclosed_fd
    }
}

/// Classifies the raw diagnostic stream of an instrumented run.
///
/// This is a textual-signature heuristic, not a parse of the instrumentation tool's output: it
/// only looks for well-known marker phrases, so it keeps working across minor format changes
/// but can be fooled by a command that prints those phrases itself.
pub fn classify_diagnostics(diagnostics: &str) -> SafetyReport {
    SafetyReport {
        leak: LEAK_MARKERS
            .iter()
            .any(|marker| diagnostics.contains(marker)),
        unclosed_fd: diagnostics.contains(UNCLOSED_FD_MARKER),
    }
}

/// Runs the candidate shell under instrumentation and classifies the result.
pub struct SafetyChecker<'a> {
    runner: ProcessRunner,
    config: &'a SafetyConfig,
    instrumented: ShellConfig,
}

impl<'a> SafetyChecker<'a> {
    /// Creates a checker that runs `candidate` through the instrumentation in `config`.
    pub fn new(runner: ProcessRunner, config: &'a SafetyConfig, candidate: &ShellConfig) -> Self {
        Self {
            runner,
            config,
            instrumented: candidate.wrapped_by(&config.instrumentation),
        }
    }

    /// Runs `command` (followed by `exit`) through the instrumented candidate.
    ///
    /// A run that exceeds the safety timeout is terminated and reported as
    /// [`Error::SafetyCheckTimedOut`] rather than as a clean result.
    pub async fn check(&self, command: &str, working_dir: &Path) -> Result<SafetyReport, Error> {
        let input = std::format!("{command}\nexit\n");

        let outcome = self
            .runner
            .run(
                &self.instrumented,
                working_dir,
                &input,
                OutputCapture::Separate,
                self.config.timeout,
            )
            .await?;

        if outcome.timed_out() {
            return Err(Error::SafetyCheckTimedOut(self.config.timeout));
        }

        let report = classify_diagnostics(&outcome.stderr);
        tracing::debug!(target: trace_categories::SAFETY, "{command:?}: {report:?}");

        if report.has_issues() {
            if let Some(log_dir) = &self.config.log_dir {
                save_log(log_dir, command, &outcome.stderr);
            }
        }

        Ok(report)
    }
}

fn save_log(log_dir: &Path, command: &str, diagnostics: &str) {
    let log_path = log_dir.join(std::format!("{}.log", util::sanitize_file_name(command)));

    let result = std::fs::create_dir_all(log_dir)
        .and_then(|()| std::fs::write(&log_path, diagnostics));

    match result {
        Ok(()) => {
            tracing::debug!(target: trace_categories::SAFETY, "saved diagnostics to {}", log_path.display());
        }
        Err(e) => {
            tracing::warn!("failed to save diagnostics to {}: {e}", log_path.display());
        }
    }
}
