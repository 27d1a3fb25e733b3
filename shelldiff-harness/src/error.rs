use std::path::PathBuf;
use std::time::Duration;

use crate::config::ShellRole;

/// Error type for the differential-execution engine.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The test case was marked to be skipped and never ran.
    #[error("test skipped")]
    Skipped,

    /// A staging or snapshot directory could not be prepared, copied, or read.
    #[error("workspace error at {}: {source}", path.display())]
    Workspace {
        /// The path being operated on.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An external program could not be started.
    #[error("failed to spawn {}: {source}", program.display())]
    Spawn {
        /// The program that failed to start.
        program: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A shell did not finish before its deadline.
    #[error("{role} command timed out after {timeout:?}")]
    TimedOut {
        /// Which shell timed out.
        role: ShellRole,
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// The instrumented run did not finish before its deadline.
    #[error("instrumented run timed out after {0:?}")]
    SafetyCheckTimedOut(Duration),

    /// The resource-safety check could not complete.
    #[error("resource-safety check failed: {0}")]
    SafetyCheck(#[source] Box<Error>),

    /// Output files of the two shells could not be compared.
    #[error("failed to compare outfiles: {0}")]
    Compare(#[source] Box<Error>),

    /// A generic I/O error occurred.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON test category file could not be parsed.
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML test category file could not be parsed.
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A directory walk failed.
    #[error("failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),
}

impl Error {
    /// Returns whether this is the marker carried by skipped test results.
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    pub(crate) fn workspace(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Workspace { path, source }
    }
}
