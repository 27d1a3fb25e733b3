//! Rendering of suite progress and results.

use std::io::Write;

use anyhow::Result;
use colored::Colorize;

use crate::{
    Mismatch, SuiteObserver, SuiteResults, Tally, TestCase, TestCategory, TestResult,
    util::{self, format_output_for_display, truncate_string, write_diff},
};

/// Number of progress glyphs printed per line.
const GLYPHS_PER_LINE: usize = 50;

/// Maximum number of characters of an error message to display.
const MAX_ERROR_LENGTH: usize = 500;

/// Maximum number of lines of output shown inline rather than as a block.
const MAX_INLINE_LINES: usize = 3;

/// Output format for suite results.
#[derive(Clone, Copy, Default, clap::ValueEnum, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// `JUnit` XML format.
    Junit,
    /// Minimal output.
    Terse,
}

/// Options controlling how progress and results are rendered.
#[derive(Clone, Debug)]
pub struct ReportOptions {
    /// Output format for the final results.
    pub format: OutputFormat,
    /// Print each test as it runs, and failures as they happen.
    pub verbose: bool,
    /// Mention leaked memory in failure details.
    pub show_leaks: bool,
    /// Mention unclosed file descriptors in failure details.
    pub show_fds: bool,
    /// Maximum number of characters of shell output to display.
    pub max_output_length: usize,
    /// Suppress failure details entirely.
    pub no_details: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            verbose: false,
            show_leaks: true,
            show_fds: true,
            max_output_length: 1000,
            no_details: false,
        }
    }
}

/// Reports suite progress as tests run.
///
/// In non-verbose mode each test is shown as a single glyph: `.` for a pass, `s` for a skip,
/// and `F` for a failure.
pub struct ProgressReporter<'a, W: Write> {
    writer: W,
    options: &'a ReportOptions,
    glyphs_on_line: usize,
}

impl<'a, W: Write> ProgressReporter<'a, W> {
    /// Creates a reporter writing to `writer`.
    pub const fn new(writer: W, options: &'a ReportOptions) -> Self {
        Self {
            writer,
            options,
            glyphs_on_line: 0,
        }
    }

    /// Consumes the reporter, returning its writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_or_log(&mut self, f: impl FnOnce(&mut W) -> std::io::Result<()>) {
        if let Err(e) = f(&mut self.writer) {
            tracing::debug!("failed to write progress: {e}");
        }
    }
}

impl<W: Write> SuiteObserver for ProgressReporter<'_, W> {
    fn category_started(&mut self, category: &TestCategory) {
        self.glyphs_on_line = 0;
        self.write_or_log(|w| {
            writeln!(
                w,
                "Running {}: {}",
                category.name.bold().blue(),
                category.description.bright_black()
            )
        });
    }

    fn test_started(&mut self, category: &TestCategory, index: usize, test: &TestCase) {
        if self.options.verbose {
            self.write_or_log(|w| {
                writeln!(
                    w,
                    "  Running test {}/{}: {}",
                    index + 1,
                    category.tests.len(),
                    test.command
                )
            });
        }
    }

    fn test_finished(&mut self, category: &TestCategory, index: usize, result: &TestResult) {
        if self.options.verbose {
            if result.is_failure() && !self.options.no_details {
                let options = self.options;
                self.write_or_log(|w| write_failure(w, options, &category.name, index + 1, result));
            }
            return;
        }

        let glyph = if result.passed {
            ".".green()
        } else if result.is_skipped() {
            "s".bold().yellow()
        } else {
            "F".bold().red()
        };

        self.glyphs_on_line += 1;
        let wrap = self.glyphs_on_line >= GLYPHS_PER_LINE && index + 1 < category.tests.len();
        if wrap {
            self.glyphs_on_line = 0;
        }

        self.write_or_log(|w| {
            write!(w, "{glyph}")?;
            if wrap {
                writeln!(w)?;
            }
            w.flush()
        });
    }

    fn category_finished(&mut self, _category: &TestCategory, results: &[TestResult]) {
        if self.options.verbose {
            return;
        }

        let tally = Tally::from_results(results);
        let padding = " ".repeat(GLYPHS_PER_LINE.saturating_sub(self.glyphs_on_line));

        self.write_or_log(|w| {
            writeln!(
                w,
                "{}",
                std::format!("{padding} {}/{}", tally.passed, tally.total()).bright_black()
            )
        });
    }

    fn category_aborted(&mut self, category: &TestCategory, error: &crate::Error) {
        self.write_or_log(|w| {
            writeln!(
                w,
                "{} category {} skipped: {error}",
                "warning:".bold().yellow(),
                category.name.bold().blue()
            )
        });
    }
}

/// Writes the details of one failed test.
pub fn write_failure<W: Write>(
    writer: &mut W,
    options: &ReportOptions,
    category: &str,
    number: usize,
    result: &TestResult,
) -> std::io::Result<()> {
    writeln!(
        writer,
        "{} {}{} {} {}",
        "Test".bold().yellow(),
        category.bold().blue(),
        std::format!("#{number}:").bright_black(),
        "✗".bold().red(),
        result.command.bright_black()
    )?;

    if let Some(error) = &result.error {
        writeln!(
            writer,
            "Error: {}",
            truncate_string(&error.to_string(), MAX_ERROR_LENGTH)
        )?;
        writeln!(writer, "{}", "─".repeat(GLYPHS_PER_LINE).bright_black())?;
        return Ok(());
    }

    let mismatches = result.mismatches();

    if let (Some(candidate), Some(reference)) = (&result.candidate, &result.reference) {
        if mismatches.contains(&Mismatch::Output) {
            writeln!(writer, "{}", "Output mismatch:".bold())?;

            if util::line_count(&candidate.output) > MAX_INLINE_LINES
                || util::line_count(&reference.output) > MAX_INLINE_LINES
            {
                let max_len = options.max_output_length;
                writeln!(
                    writer,
                    "  {}",
                    format_output_for_display(
                        &candidate.output,
                        max_len,
                        &"candidate output".bold().to_string()
                    )
                )?;
                writeln!(
                    writer,
                    "  {}",
                    format_output_for_display(
                        &reference.output,
                        max_len,
                        &"reference output".bold().to_string()
                    )
                )?;
                writeln!(writer, "{}", "Diff (candidate vs. reference):".bold())?;
                write_diff(writer, 2, &candidate.output, &reference.output)?;
            } else {
                writeln!(writer, "  candidate: {}", candidate.output)?;
                writeln!(writer, "  reference: {}", reference.output)?;
            }
        }

        if mismatches.contains(&Mismatch::ExitStatus) {
            writeln!(writer, "{}", "Exit code mismatch:".bold())?;
            writeln!(writer, "  candidate: {}", candidate.exit)?;
            writeln!(writer, "  reference: {}", reference.exit)?;
        }

        if candidate.stderr_tail != reference.stderr_tail {
            writeln!(writer, "{}", "Error message mismatch:".bold())?;
            writeln!(
                writer,
                "  candidate: {}",
                truncate_string(&candidate.stderr_tail, MAX_ERROR_LENGTH)
            )?;
            writeln!(
                writer,
                "  reference: {}",
                truncate_string(&reference.stderr_tail, MAX_ERROR_LENGTH)
            )?;
        }
    }

    if mismatches.contains(&Mismatch::Filesystem) {
        writeln!(writer, "{}", "Outfiles difference:".bold())?;
        write!(
            writer,
            "{}",
            indent::indent_all_by(
                2,
                truncate_string(&result.filesystem_diff, options.max_output_length)
            )
        )?;
        if !result.filesystem_diff.ends_with('\n') {
            writeln!(writer)?;
        }
    }

    if result.has_leak && options.show_leaks {
        writeln!(writer, "❗ {}", "Memory leaks detected".bold().red())?;
    }

    if result.has_unclosed_fd && options.show_fds {
        writeln!(
            writer,
            "❗ {}",
            "Unclosed file descriptors detected".bold().red()
        )?;
    }

    writeln!(writer, "{}", "─".repeat(GLYPHS_PER_LINE).bright_black())?;

    Ok(())
}

/// Reports suite results in the configured output format.
pub fn report_results(
    results: &SuiteResults,
    options: &ReportOptions,
    writer: &mut impl Write,
) -> Result<()> {
    match options.format {
        OutputFormat::Pretty => report_results_pretty(results, options, writer),
        OutputFormat::Junit => report_results_junit(results, options, writer),
        OutputFormat::Terse => Ok(()),
    }
}

fn report_results_pretty(
    results: &SuiteResults,
    options: &ReportOptions,
    writer: &mut impl Write,
) -> Result<()> {
    writeln!(writer, "\n{}", "TEST SUMMARY".bold())?;
    writeln!(writer, "{}", "─".repeat(GLYPHS_PER_LINE).bright_black())?;
    writeln!(writer, "Category Results:")?;

    for (name, category_results) in &results.categories {
        let tally = Tally::from_results(category_results);

        let passed = std::format!("{} passed", tally.passed);
        write!(
            writer,
            "  {}: {}",
            name.bold().blue(),
            if tally.failed > 0 {
                passed.bold().red()
            } else if tally.skipped > 0 {
                passed.bold().yellow()
            } else {
                passed.green()
            }
        )?;
        if tally.failed > 0 {
            write!(writer, ", {}", std::format!("{} failed", tally.failed).bold().red())?;
        }
        if tally.skipped > 0 {
            write!(
                writer,
                ", {}",
                std::format!("{} skipped", tally.skipped).bold().yellow()
            )?;
        }
        writeln!(
            writer,
            "{}",
            std::format!(" (total: {})", tally.total()).bright_black()
        )?;
    }

    for name in &results.aborted_categories {
        writeln!(
            writer,
            "  {}: {}",
            name.bold().blue(),
            "aborted (setup error)".bold().red()
        )?;
    }

    let tally = results.tally();
    let ran = tally.passed + tally.failed;
    match tally.pass_rate() {
        Some(rate) => {
            let summary = std::format!("{}/{ran} tests passed ({rate:.2}%)", tally.passed);
            writeln!(
                writer,
                "\n{}: {}",
                "Overall".bold(),
                if tally.failed == 0 {
                    summary.green()
                } else if tally.passed > 0 {
                    summary.bold().yellow()
                } else {
                    summary.bold().red()
                }
            )?;
        }
        None => writeln!(writer, "\n{}: no tests ran", "Overall".bold())?,
    }

    if tally.skipped > 0 {
        writeln!(
            writer,
            "{}",
            std::format!("{} tests skipped", tally.skipped).bold().yellow()
        )?;
    }

    if results.succeeded() {
        writeln!(writer, "All tests passed successfully!")?;
        return Ok(());
    }

    if tally.failed > 0 {
        writeln!(
            writer,
            "{}",
            std::format!("{} tests failed", tally.failed).bold().red()
        )?;
    }

    if options.no_details {
        writeln!(
            writer,
            "\n{}",
            "Test failure details are suppressed (--no-details flag is set)"
                .bold()
                .yellow()
        )?;
        writeln!(
            writer,
            "Re-run without the --no-details flag to see detailed failure information"
        )?;
    } else if !options.verbose && tally.failed > 0 {
        writeln!(writer, "\n{}", "FAILED TESTS DETAILS".bold().red())?;
        writeln!(writer, "{}", "─".repeat(GLYPHS_PER_LINE).bright_black())?;

        let mut failures: Vec<_> = results
            .categories
            .iter()
            .flat_map(|(name, category_results)| {
                category_results
                    .iter()
                    .enumerate()
                    .filter(|(_, result)| result.is_failure())
                    .map(move |(index, result)| (name.as_str(), index + 1, result))
            })
            .collect();
        failures.sort_by(|(a_name, a_number, _), (b_name, b_number, _)| {
            a_name.cmp(b_name).then(a_number.cmp(b_number))
        });

        for (name, number, result) in failures {
            write_failure(writer, options, name, number, result)?;
        }
    }

    Ok(())
}

fn report_results_junit(
    results: &SuiteResults,
    options: &ReportOptions,
    writer: &mut impl Write,
) -> Result<()> {
    let mut report = junit_report::Report::new();

    for (name, category_results) in &results.categories {
        let mut suite = junit_report::TestSuite::new(name);

        for (index, r) in category_results.iter().enumerate() {
            let test_case_name = r.command.as_str();
            let mut test_case: junit_report::TestCase = if r.passed {
                junit_report::TestCase::success(test_case_name, r.duration.try_into()?)
            } else if r.is_skipped() {
                junit_report::TestCase::skipped(test_case_name)
            } else {
                junit_report::TestCase::failure(
                    test_case_name,
                    r.duration.try_into()?,
                    "test failure",
                    &failure_message(r),
                )
            };

            if r.is_failure() {
                let mut output_buf: Vec<u8> = vec![];
                write_failure(&mut output_buf, options, name, index + 1, r)?;

                let output_as_string = String::from_utf8(output_buf)?;
                test_case.set_system_out(strip_ansi_escapes::strip_str(output_as_string).as_str());
            }

            suite.add_testcase(test_case);
        }

        report.add_testsuite(suite);
    }

    for name in &results.aborted_categories {
        let mut suite = junit_report::TestSuite::new(name);
        suite.add_testcase(junit_report::TestCase::error(
            "setup",
            std::time::Duration::ZERO.try_into()?,
            "setup error",
            "category aborted",
        ));
        report.add_testsuite(suite);
    }

    report.write_xml(&mut *writer)?;
    writeln!(writer)?;

    Ok(())
}

fn failure_message(result: &TestResult) -> String {
    if let Some(error) = &result.error {
        return error.to_string();
    }

    let reasons: Vec<&str> = result
        .mismatches()
        .into_iter()
        .map(|mismatch| match mismatch {
            Mismatch::Output => "output mismatch",
            Mismatch::ExitStatus => "exit code mismatch",
            Mismatch::Filesystem => "outfiles mismatch",
            Mismatch::Leak => "memory leak",
            Mismatch::UnclosedFd => "unclosed file descriptors",
        })
        .collect();

    if reasons.is_empty() {
        String::from("failed")
    } else {
        reasons.join(", ")
    }
}
