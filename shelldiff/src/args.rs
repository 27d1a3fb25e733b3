use std::path::PathBuf;

use clap::Parser;
use shelldiff_harness::reporting::{OutputFormat, ReportOptions};

use crate::{events, productinfo};

const SHORT_DESCRIPTION: &str = "Differential tester for shell implementations";

const LONG_DESCRIPTION: &str = const_format::concatcp!(
    r"
shelldiff feeds each test command to a shell under test (the candidate) and to a reference
shell, then compares their normalized output, exit status, and the files they write. It can
also run the candidate under valgrind to flag leaked memory and unclosed file descriptors.

Test categories are loaded from the tests directory: one command per line in .txt files, or
structured .json/.yaml files. Report issues at ",
    productinfo::PRODUCT_DISPLAY_URI,
    "."
);

const VERSION: &str = const_format::concatcp!(
    productinfo::PRODUCT_VERSION,
    " (",
    productinfo::PRODUCT_GIT_VERSION,
    ")"
);

/// Parsed command-line arguments for shelldiff.
#[derive(Parser)]
#[clap(name = productinfo::PRODUCT_NAME,
       version = VERSION,
       about = SHORT_DESCRIPTION,
       long_about = LONG_DESCRIPTION)]
#[allow(clippy::module_name_repetitions)]
pub struct CommandLineArgs {
    /// Path to the shell under test [default: ./minishell].
    #[clap(long = "candidate", value_name = "PATH")]
    pub candidate: Option<PathBuf>,

    /// Path to the reference shell [default: bash].
    #[clap(long = "reference", value_name = "PATH")]
    pub reference: Option<PathBuf>,

    /// Only run the given categories (comma-separated).
    #[clap(long = "categories", value_name = "NAMES", value_delimiter = ',')]
    pub categories: Vec<String>,

    /// Directory containing test files [default: ./tests].
    #[clap(long = "tests-dir", value_name = "DIR")]
    pub tests_dir: Option<PathBuf>,

    /// Print each test as it runs, and failures as they happen.
    #[clap(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Skip the valgrind resource-safety check.
    #[clap(long = "skip-safety-check", alias = "skip-valgrind")]
    pub skip_safety_check: bool,

    /// Mention leaked memory in failure details.
    #[clap(long = "show-leaks", value_name = "BOOL", default_value_t = true, action = clap::ArgAction::Set)]
    pub show_leaks: bool,

    /// Mention unclosed file descriptors in failure details.
    #[clap(long = "show-fds", value_name = "BOOL", default_value_t = true, action = clap::ArgAction::Set)]
    pub show_fds: bool,

    /// Deadline for each shell run, in seconds [default: 5].
    #[clap(long = "timeout", value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Deadline for the valgrind run, in seconds; 0 means twice the shell deadline [default: 10].
    #[clap(long = "safety-timeout", value_name = "SECS")]
    pub safety_timeout_secs: Option<u64>,

    /// List the available test categories and exit.
    #[clap(long = "list")]
    pub list: bool,

    /// Write a starter set of test files into the tests directory and exit.
    #[clap(long = "create-tests")]
    pub create_tests: bool,

    /// Maximum number of characters of shell output to display.
    #[clap(long = "max-output", value_name = "CHARS", default_value_t = 1000)]
    pub max_output_length: usize,

    /// Do not print details of failed tests.
    #[clap(long = "no-details")]
    pub no_details: bool,

    /// Output format for the results.
    #[clap(long = "format", value_name = "FORMAT", default_value = "pretty")]
    pub format: OutputFormat,

    /// Path to a config file to use instead of the default.
    #[clap(long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Do not load any config file.
    #[clap(long = "no-config")]
    pub no_config: bool,

    /// Enable debug logging for classes of tracing events.
    #[clap(long = "log-enable", value_name = "EVENT")]
    pub enabled_log_events: Vec<events::TraceEvent>,
}

impl CommandLineArgs {
    /// Returns the rendering options selected on the command line.
    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            format: self.format,
            verbose: self.verbose,
            show_leaks: self.show_leaks,
            show_fds: self.show_fds,
            max_output_length: self.max_output_length,
            no_details: self.no_details,
        }
    }
}
