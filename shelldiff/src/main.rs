//! Implements the command-line interface for `shelldiff`.

mod args;
mod config;
mod events;
mod productinfo;

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use shelldiff_harness::{
    RunnerConfig, SuiteRunner, TestCategory, TestExecutor, discover_prompt,
    fixtures::Fixtures,
    loader,
    reporting::{self, OutputFormat, ProgressReporter},
};

use crate::args::CommandLineArgs;

/// Main entry point for `shelldiff`.
fn main() {
    //
    // Set up panic handler. On release builds, it will capture panic details to a
    // temporary .toml file and report a human-readable message to the screen.
    //
    human_panic::setup_panic!(
        human_panic::Metadata::new(env!("CARGO_BIN_NAME"), env!("CARGO_PKG_VERSION"))
            .homepage(productinfo::PRODUCT_DISPLAY_URI)
    );

    let args = CommandLineArgs::parse();

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
        .and_then(|runtime| runtime.block_on(run(args)));

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("error: {:#}", e);
            1
        }
    };

    std::process::exit(i32::from(exit_code));
}

/// Runs the selected test categories. Returns the exit code.
async fn run(args: CommandLineArgs) -> anyhow::Result<u8> {
    events::init(&args.enabled_log_events);

    let loaded = config::load_config(args.no_config, args.config_file.as_deref());
    if let Some(error) = loaded.error {
        let path = loaded
            .path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        if loaded.explicit_path {
            return Err(anyhow::Error::new(error).context(std::format!("config file {path}")));
        }
        tracing::warn!("ignoring config file {path}: {error}");
    }
    let config = loaded.config;

    let tests_dir = config.tests_dir(&args);

    if args.create_tests {
        loader::write_default_categories(&tests_dir)?;
        println!("Created starter tests in {}", tests_dir.display());
        return Ok(0);
    }

    let categories = loader::load_categories(&tests_dir)?;

    if args.list {
        print_categories(&categories, &tests_dir)?;
        return Ok(0);
    }

    let selected = loader::select_categories(categories, &args.categories);
    if selected.is_empty() {
        if args.categories.is_empty() {
            println!("No test categories found in {}", tests_dir.display());
        } else {
            println!(
                "No test categories found matching: {}",
                args.categories.join(", ")
            );
        }
        return Ok(1);
    }

    let runner_config = config.to_runner_config(&args);
    check_candidate(&runner_config)?;

    let report_options = args.report_options();

    let fixtures = Fixtures::setup(&runner_config.workspace)?;

    let executor = TestExecutor::new(&runner_config);
    let prompt = discover_prompt(
        executor.runner(),
        &runner_config.candidate,
        &runner_config.workspace.root,
        runner_config.timeout,
    )
    .await;
    tracing::debug!(target: shelldiff_harness::trace_categories::SUITE, "using prompt {prompt:?}");

    // Keep stdout clean for machine-readable reports.
    let progress: Box<dyn Write> = if report_options.format == OutputFormat::Junit {
        Box::new(std::io::stderr())
    } else {
        Box::new(std::io::stdout())
    };
    let mut reporter = ProgressReporter::new(progress, &report_options);

    let results = SuiteRunner::new(executor)
        .run(&selected, &prompt, &mut reporter)
        .await;

    fixtures.teardown();

    reporting::report_results(&results, &report_options, &mut std::io::stdout().lock())?;

    Ok(results.exit_status())
}

fn print_categories(categories: &[TestCategory], tests_dir: &Path) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();

    writeln!(stdout, "Available test categories in {}:", tests_dir.display())?;
    for category in categories {
        writeln!(
            stdout,
            "  {} - {} ({} tests)",
            category.name,
            category.description,
            category.tests.len()
        )?;
    }

    Ok(())
}

/// Fails early when the shell under test is given as a path that does not exist.
fn check_candidate(config: &RunnerConfig) -> anyhow::Result<()> {
    let program = &config.candidate.program;
    if program.components().count() > 1 && !program.exists() {
        anyhow::bail!(
            "shell under test not found at {}; build it or pass --candidate",
            program.display()
        );
    }

    Ok(())
}
