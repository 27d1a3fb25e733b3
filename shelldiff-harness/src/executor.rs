//! Execution of a single test case through both shells.

use std::time::{Duration, Instant};

use crate::{
    Error, ExitOutcome, OutputCapture, ProcessRunner, RunnerConfig, SafetyChecker, ShellRole,
    SnapshotSide, TestCase, diff_dirs, normalize, trace_categories,
};

/// What one shell observably did for a test case.
#[derive(Clone, Debug)]
pub struct ShellRun {
    /// Normalized standard output.
    pub output: String,
    /// Exit status, or the timed-out sentinel.
    pub exit: ExitOutcome,
    /// The "relevant part" of standard error; informational only.
    pub stderr_tail: String,
    /// Wall-clock time the shell ran for.
    pub duration: Duration,
}

/// A way in which the two shells' behavior differed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mismatch {
    /// Normalized outputs differ.
    Output,
    /// Exit statuses differ.
    ExitStatus,
    /// Filesystem side effects differ.
    Filesystem,
    /// The instrumented run reported leaked memory.
    Leak,
    /// The instrumented run reported unclosed file descriptors.
    UnclosedFd,
}

/// The immutable outcome of executing one test case.
#[derive(Debug)]
pub struct TestResult {
    /// The command line that was tested.
    pub command: String,
    /// Whether the candidate matched the reference on every compared dimension.
    pub passed: bool,
    /// The candidate's run, if it got that far.
    pub candidate: Option<ShellRun>,
    /// The reference's run, if it got that far.
    pub reference: Option<ShellRun>,
    /// Description of filesystem side-effect differences; empty when there are none.
    pub filesystem_diff: String,
    /// Whether the instrumented run reported leaked memory.
    pub has_leak: bool,
    /// Whether the instrumented run reported unclosed file descriptors.
    pub has_unclosed_fd: bool,
    /// Total time spent on this test case.
    pub duration: Duration,
    /// What stopped the test case from running to completion, if anything.
    pub error: Option<Error>,
}

impl TestResult {
    fn new(command: &str) -> Self {
        Self {
            command: command.to_owned(),
            passed: false,
            candidate: None,
            reference: None,
            filesystem_diff: String::new(),
            has_leak: false,
            has_unclosed_fd: false,
            duration: Duration::ZERO,
            error: None,
        }
    }

    /// Creates the result recorded for a test case that was skipped.
    pub fn skipped(command: &str) -> Self {
        Self {
            error: Some(Error::Skipped),
            ..Self::new(command)
        }
    }

    /// Returns whether this result is the marker of a skipped test case.
    pub fn is_skipped(&self) -> bool {
        self.error.as_ref().is_some_and(Error::is_skip)
    }

    /// Returns whether this result counts as a failure (not passed, not skipped).
    pub fn is_failure(&self) -> bool {
        !self.passed && !self.is_skipped()
    }

    /// Returns the compared dimensions on which the two shells differed.
    pub fn mismatches(&self) -> Vec<Mismatch> {
        let mut mismatches = vec![];

        if let (Some(candidate), Some(reference)) = (&self.candidate, &self.reference) {
            if candidate.output != reference.output {
                mismatches.push(Mismatch::Output);
            }
            if candidate.exit != reference.exit {
                mismatches.push(Mismatch::ExitStatus);
            }
        }
        if !self.filesystem_diff.is_empty() {
            mismatches.push(Mismatch::Filesystem);
        }
        if self.has_leak {
            mismatches.push(Mismatch::Leak);
        }
        if self.has_unclosed_fd {
            mismatches.push(Mismatch::UnclosedFd);
        }

        mismatches
    }

    fn fail(mut self, error: Error, start_time: Instant) -> Self {
        tracing::debug!(target: trace_categories::SUITE, "{:?}: {error}", self.command);
        self.error = Some(error);
        self.duration = start_time.elapsed();
        self
    }
}

/// Executes test cases, one at a time, against the shells and workspace of a [`RunnerConfig`].
pub struct TestExecutor<'a> {
    config: &'a RunnerConfig,
    runner: ProcessRunner,
    safety: Option<SafetyChecker<'a>>,
}

impl<'a> TestExecutor<'a> {
    /// Creates an executor for the given configuration.
    pub fn new(config: &'a RunnerConfig) -> Self {
        let runner = ProcessRunner::new(config.grace_period);
        let safety = config
            .safety
            .enabled
            .then(|| SafetyChecker::new(runner, &config.safety, &config.candidate));

        Self {
            config,
            runner,
            safety,
        }
    }

    /// Returns the process runner used for every spawned shell.
    pub const fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    /// Executes one test case, comparing the candidate against the reference using `prompt`
    /// to filter the candidate's interactive echo.
    ///
    /// Per-test problems (spawn failures, timeouts, safety-check failures) are recorded in the
    /// returned [`TestResult`]. Only failing to prepare the staging and snapshot directories is
    /// returned as `Err`, since it affects every subsequent test case as well.
    pub async fn execute(&self, test: &TestCase, prompt: &str) -> Result<TestResult, Error> {
        if test.skip {
            tracing::debug!(target: trace_categories::SUITE, "skipping {:?}", test.command);
            return Ok(TestResult::skipped(&test.command));
        }

        let start_time = Instant::now();
        let workspace = &self.config.workspace;
        let mut result = TestResult::new(&test.command);

        workspace.clean_all()?;

        let input = std::format!("{}\n", test.command);

        // Candidate.
        let candidate = match self.run_shell(ShellRole::Candidate, &input, Some(prompt)).await {
            Ok(run) => run,
            Err(e) => return Ok(result.fail(e, start_time)),
        };
        let candidate_timed_out = candidate.exit == ExitOutcome::TimedOut;
        result.candidate = Some(candidate);
        if candidate_timed_out {
            return Ok(self.timed_out(result, ShellRole::Candidate));
        }

        if let Err(e) = workspace.snapshot(SnapshotSide::Candidate) {
            return Ok(result.fail(Error::Compare(Box::new(e)), start_time));
        }

        // Reference, isolated from the candidate's side effects.
        workspace.clean_staging()?;

        let reference = match self.run_shell(ShellRole::Reference, &input, None).await {
            Ok(run) => run,
            Err(e) => return Ok(result.fail(e, start_time)),
        };
        let reference_timed_out = reference.exit == ExitOutcome::TimedOut;
        result.reference = Some(reference);
        if reference_timed_out {
            return Ok(self.timed_out(result, ShellRole::Reference));
        }

        if let Err(e) = workspace.snapshot(SnapshotSide::Reference) {
            return Ok(result.fail(Error::Compare(Box::new(e)), start_time));
        }

        // Filesystem side effects.
        match diff_dirs(&workspace.candidate_dir, &workspace.reference_dir) {
            Ok(comparison) => result.filesystem_diff = comparison.describe(),
            Err(e) => return Ok(result.fail(Error::Compare(Box::new(e)), start_time)),
        }

        // Resource safety.
        if let Some(checker) = &self.safety {
            match checker.check(&test.command, &workspace.root).await {
                Ok(report) => {
                    result.has_leak = report.leak;
                    result.has_unclosed_fd = report.unclosed_fd;
                }
                Err(e @ Error::SafetyCheckTimedOut(_)) => {
                    return Ok(result.fail(e, start_time));
                }
                Err(e) => return Ok(result.fail(Error::SafetyCheck(Box::new(e)), start_time)),
            }
        }

        result.passed = self.is_pass(&result);
        result.duration = start_time.elapsed();

        tracing::debug!(target: trace_categories::SUITE, "{:?}: passed={} in {:?}", test.command, result.passed, result.duration);

        Ok(result)
    }

    async fn run_shell(
        &self,
        role: ShellRole,
        input: &str,
        prompt: Option<&str>,
    ) -> Result<ShellRun, Error> {
        let outcome = self
            .runner
            .run(
                self.config.shell(role),
                &self.config.workspace.root,
                input,
                OutputCapture::Separate,
                self.config.timeout,
            )
            .await?;

        tracing::debug!(target: trace_categories::PROCESS, "{role} exited with {} after {:?}", outcome.exit, outcome.duration);

        Ok(ShellRun {
            output: normalize::normalize(&outcome.stdout, prompt),
            exit: outcome.exit,
            stderr_tail: normalize::relevant_error_text(&outcome.stderr),
            duration: outcome.duration,
        })
    }

    fn timed_out(&self, mut result: TestResult, role: ShellRole) -> TestResult {
        let timeout = self.config.timeout;
        tracing::debug!(target: trace_categories::SUITE, "{:?}: {role} timed out", result.command);

        result.error = Some(Error::TimedOut { role, timeout });
        result.duration = timeout;
        result
    }

    fn is_pass(&self, result: &TestResult) -> bool {
        let (Some(candidate), Some(reference)) = (&result.candidate, &result.reference) else {
            return false;
        };

        let safe = self.safety.is_none() || !(result.has_leak || result.has_unclosed_fd);

        result.error.is_none()
            && candidate.output == reference.output
            && candidate.exit == reference.exit
            && result.filesystem_diff.is_empty()
            && safe
    }
}
