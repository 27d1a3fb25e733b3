//! Sequencing of test categories and aggregation of their results.

use indexmap::IndexMap;

use crate::{Error, TestCase, TestCategory, TestExecutor, TestResult, trace_categories};

/// Receives progress notifications while a suite runs.
///
/// All methods default to doing nothing.
pub trait SuiteObserver {
    /// Called before the first test of a category runs.
    fn category_started(&mut self, _category: &TestCategory) {}

    /// Called before a test case runs. `index` is zero-based.
    fn test_started(&mut self, _category: &TestCategory, _index: usize, _test: &TestCase) {}

    /// Called after a test case has produced its result. `index` is zero-based.
    fn test_finished(&mut self, _category: &TestCategory, _index: usize, _result: &TestResult) {}

    /// Called after every test of a category has run.
    fn category_finished(&mut self, _category: &TestCategory, _results: &[TestResult]) {}

    /// Called when a category is abandoned because shared preconditions could not be set up.
    fn category_aborted(&mut self, _category: &TestCategory, _error: &Error) {}
}

/// An observer that ignores every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl SuiteObserver for NoopObserver {}

/// Pass/fail/skip counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    /// Number of passed tests.
    pub passed: usize,
    /// Number of failed tests.
    pub failed: usize,
    /// Number of skipped tests.
    pub skipped: usize,
}

impl Tally {
    /// Counts the given results.
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a TestResult>) -> Self {
        let mut tally = Self::default();
        for result in results {
            tally.record(result);
        }
        tally
    }

    /// Counts one result.
    pub fn record(&mut self, result: &TestResult) {
        if result.passed {
            self.passed += 1;
        } else if result.is_skipped() {
            self.skipped += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Total number of results counted, including skipped ones.
    pub const fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }

    /// Percentage of passed tests among those that ran; skipped tests are not in the
    /// denominator. Returns `None` when nothing ran.
    #[allow(clippy::cast_precision_loss)]
    pub fn pass_rate(&self) -> Option<f64> {
        let ran = self.passed + self.failed;
        (ran > 0).then(|| self.passed as f64 / ran as f64 * 100.0)
    }
}

impl std::ops::AddAssign for Tally {
    fn add_assign(&mut self, other: Self) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

/// Results of a suite run, in the order categories were run.
#[derive(Debug, Default)]
pub struct SuiteResults {
    /// Results of each category that ran, keyed by category name.
    pub categories: IndexMap<String, Vec<TestResult>>,
    /// Names of categories abandoned because of a setup error.
    pub aborted_categories: Vec<String>,
}

impl SuiteResults {
    /// Counts results across all categories.
    pub fn tally(&self) -> Tally {
        Tally::from_results(self.categories.values().flatten())
    }

    /// Counts results of one category, or returns `None` if it did not run.
    pub fn category_tally(&self, name: &str) -> Option<Tally> {
        self.categories.get(name).map(Tally::from_results)
    }

    /// Returns whether every test that ran passed and no category was abandoned.
    pub fn succeeded(&self) -> bool {
        self.aborted_categories.is_empty() && self.tally().failed == 0
    }

    /// Returns the process exit status for this run: 0 on success, 1 otherwise.
    pub fn exit_status(&self) -> u8 {
        if self.succeeded() { 0 } else { 1 }
    }
}

/// Runs categories of test cases, strictly one test at a time.
pub struct SuiteRunner<'a> {
    executor: TestExecutor<'a>,
}

impl<'a> SuiteRunner<'a> {
    /// Creates a suite runner around the given executor.
    pub const fn new(executor: TestExecutor<'a>) -> Self {
        Self { executor }
    }

    /// Runs `categories` in order, each category's tests in file order, and collects their
    /// results.
    ///
    /// A category whose workspace cannot be set up is abandoned with a warning; the remaining
    /// categories still run.
    pub async fn run(
        &self,
        categories: &[TestCategory],
        prompt: &str,
        observer: &mut impl SuiteObserver,
    ) -> SuiteResults {
        let mut results = SuiteResults::default();

        for category in categories {
            observer.category_started(category);

            match self.run_category(category, prompt, observer).await {
                Ok(category_results) => {
                    let tally = Tally::from_results(&category_results);
                    tracing::debug!(target: trace_categories::SUITE, "{}: {tally:?}", category.name);

                    observer.category_finished(category, &category_results);
                    results
                        .categories
                        .insert(category.name.clone(), category_results);
                }
                Err(e) => {
                    tracing::warn!("skipping category {}: {e}", category.name);

                    observer.category_aborted(category, &e);
                    results.aborted_categories.push(category.name.clone());
                }
            }
        }

        results
    }

    async fn run_category(
        &self,
        category: &TestCategory,
        prompt: &str,
        observer: &mut impl SuiteObserver,
    ) -> Result<Vec<TestResult>, Error> {
        let mut results = Vec::with_capacity(category.tests.len());

        for (index, test) in category.tests.iter().enumerate() {
            observer.test_started(category, index, test);

            let result = self.executor.execute(test, prompt).await?;

            observer.test_finished(category, index, &result);
            results.push(result);
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn result(passed: bool) -> TestResult {
        let mut result = TestResult::skipped("true");
        result.error = None;
        result.passed = passed;
        result
    }

    #[test]
    fn tally_excludes_skipped_from_pass_rate() {
        let mut results: Vec<_> = (0..7).map(|_| result(true)).collect();
        results.extend((0..2).map(|_| result(false)));
        results.push(TestResult::skipped("exit"));

        let tally = Tally::from_results(&results);
        assert_eq!(
            tally,
            Tally {
                passed: 7,
                failed: 2,
                skipped: 1
            }
        );
        assert_eq!(tally.total(), 10);

        let rate = tally.pass_rate().unwrap_or_default();
        assert!((rate - 700.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn empty_tally_has_no_pass_rate() {
        assert_eq!(Tally::default().pass_rate(), None);

        let only_skipped = Tally {
            skipped: 3,
            ..Tally::default()
        };
        assert_eq!(only_skipped.pass_rate(), None);
    }

    #[test]
    fn exit_status_reflects_failures_and_aborts() {
        let mut results = SuiteResults::default();
        results
            .categories
            .insert("echo".into(), vec![result(true), TestResult::skipped("x")]);
        assert_eq!(results.exit_status(), 0);

        results.aborted_categories.push("pipes".into());
        assert_eq!(results.exit_status(), 1);

        results.aborted_categories.clear();
        results
            .categories
            .insert("redirs".into(), vec![result(false)]);
        assert_eq!(results.exit_status(), 1);
        assert_eq!(
            results.category_tally("redirs"),
            Some(Tally {
                passed: 0,
                failed: 1,
                skipped: 0
            })
        );
    }
}
