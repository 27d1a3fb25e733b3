//! Configuration file support for shelldiff.
//!
//! Settings are layered: built-in defaults < config file < command-line arguments. Unknown keys
//! in the TOML file are ignored.

use etcetera::BaseStrategy;
use shelldiff_harness::{RunnerConfig, SafetyConfig, ShellConfig, Workspace};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::args::CommandLineArgs;

const DEFAULT_CANDIDATE: &str = "./minishell";
const DEFAULT_REFERENCE: &str = "bash";
const DEFAULT_TESTS_DIR: &str = "./tests";
const DEFAULT_SAFETY_PROGRAM: &str = "valgrind";
const VALGRIND_LOG_DIR: &str = "valgrind_logs";

/// Root configuration structure.
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which shells to compare.
    pub shells: ShellsConfig,

    /// Deadlines.
    pub limits: LimitsConfig,

    /// Resource-safety check.
    pub safety: SafetyFileConfig,

    /// Locations of tests and of the directories shells write into.
    pub paths: PathsConfig,
}

/// Shell selection.
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(default)]
pub struct ShellsConfig {
    /// Path to the shell under test.
    pub candidate: Option<PathBuf>,

    /// Path to the reference shell.
    pub reference: Option<PathBuf>,

    /// Extra arguments for the reference shell.
    #[serde(rename = "reference-args")]
    pub reference_args: Option<Vec<String>>,
}

/// Deadlines.
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Deadline for each shell run, in seconds.
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: Option<u64>,

    /// Deadline for the instrumented run, in seconds; 0 means twice the shell deadline.
    #[serde(rename = "safety-timeout-secs")]
    pub safety_timeout_secs: Option<u64>,

    /// Time between the interrupt and the forced kill of a timed-out shell.
    #[serde(rename = "grace-period-millis")]
    pub grace_period_millis: Option<u64>,
}

/// Resource-safety check settings.
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(default)]
pub struct SafetyFileConfig {
    /// Whether the check runs.
    pub enabled: Option<bool>,

    /// Instrumentation program.
    pub program: Option<PathBuf>,

    /// Arguments for the instrumentation program, replacing the built-in ones.
    pub args: Option<Vec<String>>,

    /// Suppressions file passed to valgrind.
    pub suppressions: Option<PathBuf>,
}

/// Directory locations.
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory containing test files.
    pub tests: Option<PathBuf>,

    /// Directory shells write redirection side effects into.
    pub staging: Option<PathBuf>,

    /// Snapshot directory for the shell under test.
    #[serde(rename = "candidate-snapshots")]
    pub candidate_snapshots: Option<PathBuf>,

    /// Snapshot directory for the reference shell.
    #[serde(rename = "reference-snapshots")]
    pub reference_snapshots: Option<PathBuf>,
}

impl Config {
    /// Resolves the tests directory.
    pub fn tests_dir(&self, args: &CommandLineArgs) -> PathBuf {
        args.tests_dir
            .clone()
            .or_else(|| self.paths.tests.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TESTS_DIR))
    }

    /// Builds the engine configuration, merging with CLI arguments.
    ///
    /// Command-line values win over config file values, which win over built-in defaults.
    /// Shells run in the current directory.
    pub fn to_runner_config(&self, args: &CommandLineArgs) -> RunnerConfig {
        let candidate = args
            .candidate
            .clone()
            .or_else(|| self.shells.candidate.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CANDIDATE));
        let reference = args
            .reference
            .clone()
            .or_else(|| self.shells.reference.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REFERENCE));
        let reference = ShellConfig::new(reference)
            .with_args(self.shells.reference_args.iter().flatten().cloned());

        let mut workspace = Workspace::under(".");
        if let Some(dir) = &self.paths.staging {
            workspace.staging_dir.clone_from(dir);
        }
        if let Some(dir) = &self.paths.candidate_snapshots {
            workspace.candidate_dir.clone_from(dir);
        }
        if let Some(dir) = &self.paths.reference_snapshots {
            workspace.reference_dir.clone_from(dir);
        }

        let mut config = RunnerConfig::new(ShellConfig::new(candidate), reference, workspace);

        if let Some(secs) = args.timeout_secs.or(self.limits.timeout_secs) {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(millis) = self.limits.grace_period_millis {
            config = config.with_grace_period(Duration::from_millis(millis));
        }

        let safety = self.to_safety_config(args);
        config.with_safety(safety)
    }

    fn to_safety_config(&self, args: &CommandLineArgs) -> SafetyConfig {
        let program = self
            .safety
            .program
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SAFETY_PROGRAM));

        let mut instrumentation = match &self.safety.args {
            Some(custom) => ShellConfig::new(program).with_args(custom.iter().cloned()),
            None => ShellConfig::new(program).with_args(SafetyConfig::DEFAULT_VALGRIND_ARGS),
        };
        if let Some(suppressions) = &self.safety.suppressions {
            instrumentation = instrumentation.with_args([std::format!(
                "--suppressions={}",
                suppressions.to_string_lossy()
            )]);
        }

        let mut safety = SafetyConfig {
            enabled: !args.skip_safety_check && self.safety.enabled.unwrap_or(true),
            instrumentation,
            ..SafetyConfig::disabled()
        };

        if let Some(secs) = args.safety_timeout_secs.or(self.limits.safety_timeout_secs) {
            safety.timeout = Duration::from_secs(secs);
        }
        if args.verbose {
            safety.log_dir = Some(std::env::temp_dir().join(VALGRIND_LOG_DIR));
        }

        safety
    }
}

/// Result of attempting to load a configuration file.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration, or default if loading failed.
    pub config: Config,

    /// The path that was used (or attempted) for loading.
    pub path: Option<PathBuf>,

    /// Any error that occurred during loading.
    pub error: Option<ConfigLoadError>,

    /// Whether the path was explicitly provided by the user (via `--config`).
    /// If true and there's an error, the run should fail rather than continue.
    pub explicit_path: bool,
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigLoadError {
    /// Failed to read the configuration file.
    Io(std::io::Error),

    /// Failed to parse the TOML content.
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {e}"),
            Self::Parse(e) => write!(f, "failed to parse config file: {e}"),
        }
    }
}

impl std::error::Error for ConfigLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
        }
    }
}

/// Returns the default configuration file path for the current platform, or `None` if the
/// platform's config directory cannot be determined.
pub fn default_config_path() -> Option<PathBuf> {
    let strategy = etcetera::choose_base_strategy().ok()?;
    Some(strategy.config_dir().join("shelldiff").join("config.toml"))
}

fn load_from_path(path: &Path) -> ConfigLoadResult {
    let loaded = std::fs::read_to_string(path)
        .map_err(ConfigLoadError::Io)
        .and_then(|content| toml::from_str(&content).map_err(ConfigLoadError::Parse));

    let (config, error) = match loaded {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    ConfigLoadResult {
        config,
        path: Some(path.to_path_buf()),
        error,
        explicit_path: false,
    }
}

/// Loads configuration, from `explicit_path` if given and otherwise from the default location.
///
/// A missing file at the default location silently yields defaults. If `explicit_path` is
/// provided and loading fails, the result has `explicit_path: true` so the caller can treat the
/// error as fatal.
pub fn load_config(disabled: bool, explicit_path: Option<&Path>) -> ConfigLoadResult {
    let defaults = || ConfigLoadResult {
        config: Config::default(),
        path: None,
        error: None,
        explicit_path: false,
    };

    if disabled {
        return defaults();
    }

    let is_explicit = explicit_path.is_some();

    let Some(path) = explicit_path
        .map(Path::to_path_buf)
        .or_else(default_config_path)
    else {
        return defaults();
    };

    if !is_explicit && !path.exists() {
        return ConfigLoadResult {
            path: Some(path),
            ..defaults()
        };
    }

    let mut result = load_from_path(&path);
    result.explicit_path = is_explicit;
    result
}
