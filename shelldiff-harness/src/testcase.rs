//! Test case definitions.

use serde::{Deserialize, Serialize};

/// A single command line to run through both shells.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct TestCase {
    /// The command line fed to each shell on stdin.
    #[serde(alias = "Command")]
    pub command: String,

    /// Optional description of what is being tested.
    #[serde(default, alias = "Description")]
    pub description: String,

    /// Whether to skip this test.
    #[serde(default, alias = "Skip")]
    pub skip: bool,
}

impl TestCase {
    /// Creates a non-skipped test case for the given command.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Marks this test case as skipped.
    #[must_use]
    pub const fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }
}

/// A named, ordered group of related test cases.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct TestCategory {
    /// Name of the category (e.g. `builtins`, `pipes`).
    #[serde(alias = "Name")]
    pub name: String,

    /// Description of this category.
    #[serde(default, alias = "Description")]
    pub description: String,

    /// Test cases in file order.
    #[serde(default, alias = "Tests", alias = "cases")]
    pub tests: Vec<TestCase>,
}

impl TestCategory {
    /// Creates a category with the default description.
    pub fn new(name: impl Into<String>, tests: Vec<TestCase>) -> Self {
        let name = name.into();
        Self {
            description: format!("Tests for {name} commands"),
            name,
            tests,
        }
    }
}
