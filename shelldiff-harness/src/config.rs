//! Configuration types for the engine.

use std::{fmt::Display, path::PathBuf, time::Duration};

use crate::workspace::Workspace;

/// Default per-shell timeout for functional runs.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for the instrumented resource-safety run.
pub const DEFAULT_SAFETY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default window between the interrupt signal and a forced kill.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(500);

/// Which side of the comparison a shell is on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShellRole {
    /// The shell implementation under test.
    Candidate,
    /// The trusted shell used as the comparison oracle.
    Reference,
}

impl Display for ShellRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Candidate => write!(f, "candidate"),
            Self::Reference => write!(f, "reference"),
        }
    }
}

/// Configuration for invoking a shell (or any program that reads commands on stdin).
#[derive(Clone, Debug)]
pub struct ShellConfig {
    /// Path to the program.
    pub program: PathBuf,
    /// Arguments to pass to the program.
    pub args: Vec<String>,
    /// Environment variables set on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

impl ShellConfig {
    /// Creates a configuration that runs `program` with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            env: vec![],
        }
    }

    /// Appends the given arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds an environment variable override.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Creates a command for this shell, rooted in the given working directory.
    pub(crate) fn create_command(&self, working_dir: &std::path::Path) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args).current_dir(working_dir);

        for (k, v) in &self.env {
            cmd.env(k, v);
        }

        cmd
    }

    /// Returns a configuration that launches this shell through `wrapper`, which receives
    /// `wrapper_args` followed by this shell's program and arguments.
    pub(crate) fn wrapped_by(&self, wrapper: &ShellConfig) -> Self {
        let mut args = wrapper.args.clone();
        args.push(self.program.to_string_lossy().to_string());
        args.extend(self.args.iter().cloned());

        let mut env = wrapper.env.clone();
        env.extend(self.env.iter().cloned());

        Self {
            program: wrapper.program.clone(),
            args,
            env,
        }
    }
}

/// Configuration for the resource-safety (leak and descriptor tracking) check.
#[derive(Clone, Debug)]
pub struct SafetyConfig {
    /// Whether the check runs at all. When disabled it never affects pass/fail.
    pub enabled: bool,
    /// The instrumentation wrapper; the candidate shell is appended to its arguments.
    pub instrumentation: ShellConfig,
    /// Deadline for the instrumented run.
    pub timeout: Duration,
    /// Directory to save raw diagnostics of flagged runs in, if any.
    pub log_dir: Option<PathBuf>,
}

impl SafetyConfig {
    /// Arguments passed to valgrind by default.
    pub const DEFAULT_VALGRIND_ARGS: [&str; 5] = [
        "--leak-check=full",
        "--show-leak-kinds=all",
        "--track-fds=yes",
        "--track-origins=yes",
        "--errors-for-leak-kinds=all",
    ];

    /// Creates a valgrind-based configuration, optionally with a suppressions file.
    pub fn valgrind(suppressions: Option<PathBuf>) -> Self {
        let mut instrumentation =
            ShellConfig::new("valgrind").with_args(Self::DEFAULT_VALGRIND_ARGS);

        if let Some(suppressions) = suppressions {
            instrumentation
                .args
                .push(format!("--suppressions={}", suppressions.to_string_lossy()));
        }

        Self {
            enabled: true,
            instrumentation,
            timeout: DEFAULT_SAFETY_TIMEOUT,
            log_dir: None,
        }
    }

    /// Returns a disabled configuration.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::valgrind(None)
        }
    }
}

/// Fully resolved configuration for a suite run.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// The shell under test.
    pub candidate: ShellConfig,
    /// The shell used as the comparison oracle.
    pub reference: ShellConfig,
    /// Directories owned by the engine.
    pub workspace: Workspace,
    /// Deadline for each functional run.
    pub timeout: Duration,
    /// Window between the interrupt signal and a forced kill.
    pub grace_period: Duration,
    /// Resource-safety check configuration.
    pub safety: SafetyConfig,
}

impl RunnerConfig {
    /// Creates a new runner config with default limits and the resource-safety check disabled.
    pub fn new(candidate: ShellConfig, reference: ShellConfig, workspace: Workspace) -> Self {
        Self {
            candidate,
            reference,
            workspace,
            timeout: DEFAULT_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            safety: SafetyConfig::disabled(),
        }
    }

    /// Sets the deadline for each functional run.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the termination grace window.
    #[must_use]
    pub const fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Sets the resource-safety configuration. A zero safety timeout is replaced with twice
    /// the functional timeout.
    #[must_use]
    pub fn with_safety(mut self, mut safety: SafetyConfig) -> Self {
        if safety.timeout.is_zero() {
            safety.timeout = self.timeout.saturating_mul(2);
        }

        self.safety = safety;
        self
    }

    /// Returns the shell configuration for the given role.
    pub const fn shell(&self, role: ShellRole) -> &ShellConfig {
        match role {
            ShellRole::Candidate => &self.candidate,
            ShellRole::Reference => &self.reference,
        }
    }
}
