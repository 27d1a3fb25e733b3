//! Loading test categories from a directory of test files.
//!
//! Three formats are recognized, by extension:
//!
//! * `.txt` (or no extension): one command per non-empty line. The category is named after the
//!   file stem.
//! * `.json`: a serialized [`TestCategory`].
//! * `.yaml` / `.yml`: a serialized [`TestCategory`], with test cases under `tests` or `cases`.
//!
//! Files with other extensions, and hidden files, are ignored.

use std::path::Path;

use crate::{Error, TestCase, TestCategory, trace_categories};

/// Starter categories written into a fresh tests directory, as `(name, commands)`.
const DEFAULT_TEXT_CATEGORIES: &[(&str, &[&str])] = &[
    ("empty_prompt", &[" ", "                    ", ":", "!"]),
    (
        "parsing_errors",
        &[
            ">", "<", ">>", "<<", "<>", ">>>>>", "<<<<<", "> > > >", "|", "| bonjour", "| | |",
            "||", "|||||", ">>|><", "&&", "&&&&&",
        ],
    ),
    ("path_dir", &["/", "//", "/.", "/./../../../../..", "///////"]),
    (
        "cmd_not_found",
        &["\"bonjour\"", "bonjour", "bonjour comment va", "Makefile"],
    ),
    (
        "echo",
        &[
            "echo",
            "echo -n",
            "echo Hola",
            "echoHola",
            "echo -n Hola",
            "echo \"-n\" Hola",
            "echo -nHola",
            "echo Hola -n",
            "echo    Hola     Que    Tal",
            "echo \"         \" | cat -e",
            "echo -n -nnn hola -nnnn",
            "echo $?",
            "echo \" $ \" | cat -e",
            "echo $HOME",
            "echo $DONTEXIST Hola",
            "echo ''h'o'la''",
            "echo \"'\"h'o'la\"'\"",
            "\"e\"'c'ho 'b'\"o\"nj\"o\"'u'r",
            "echo \"$DONTEXIST\"\"Makefile\"",
        ],
    ),
    (
        "exit",
        &[
            "exit",
            "exit exit",
            "exit hola",
            "exit 42",
            "exit 000042",
            "exit 666",
            "exit 666 666",
            "exit hola 666",
            "exit 259",
            "exit -4",
            "exit +42",
            "exit --666",
            "exit '666'",
            "exit '2'66'32'",
            "exit 9223372036854775807",
            "exit 9223372036854775808",
            "exit -9223372036854775809",
        ],
    ),
    (
        "pipes",
        &[
            "echo hello | cat",
            "echo hello | cat | grep hello",
            "ls | exit 42",
            "exit | ls",
            "echo | echo",
            "echo oui | echo non | echo hola | grep oui",
            "echo hola | cat -e | cat -e | cat -e",
            "cd .. | pwd",
            "ls | hola",
            "ls | ls | hola | rev",
            "echo hola || cat",
            "ech|o hola | cat",
            "export HOLA=bonjour | cat -e | cat -e",
            "sleep 1 | exit",
        ],
    ),
    (
        "redirects",
        &[
            "echo hola > ./outfiles/outfile01",
            "echo hola >> ./outfiles/outfile01",
            "cat < ./test_files/infile",
            "cat < ./test_files/infile > ./outfiles/outfile02",
            "grep hi < ./test_files/infile_big",
            "cat < ./test_files/invalid_permission",
            "echo hola > ./test_files/invalid_permission",
            "cat <missing > ./outfiles/outfile03",
            "echo hola <<< bonjour",
        ],
    ),
];

/// Loads every test category under `dir`, in file-name order.
///
/// A missing directory is created and seeded with the starter categories. Files that cannot be
/// read or parsed are skipped with a warning.
pub fn load_categories(dir: &Path) -> Result<Vec<TestCategory>, Error> {
    if !dir.exists() {
        tracing::info!("creating tests directory {} with starter tests", dir.display());
        write_default_categories(dir)?;
    }

    let mut categories = vec![];

    for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || entry.file_name().to_string_lossy().starts_with('.')
        {
            continue;
        }

        let path = entry.path();
        let loaded = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => load_json(path),
            Some("yaml" | "yml") => load_yaml(path),
            Some("txt") | None => load_text(path),
            Some(_) => continue,
        };

        match loaded {
            Ok(category) => {
                tracing::debug!(target: trace_categories::SUITE, "loaded {} tests of category {} from {}", category.tests.len(), category.name, path.display());
                categories.push(category);
            }
            Err(e) => {
                tracing::warn!("failed to load test file {}: {e}", path.display());
            }
        }
    }

    Ok(categories)
}

/// Keeps only the categories whose names are in `names`, preserving their loaded order.
/// An empty `names` selects every category.
pub fn select_categories(categories: Vec<TestCategory>, names: &[String]) -> Vec<TestCategory> {
    if names.is_empty() {
        return categories;
    }

    categories
        .into_iter()
        .filter(|category| names.iter().any(|name| *name == category.name))
        .collect()
}

/// Writes the starter categories into `dir`, creating it if needed.
pub fn write_default_categories(dir: &Path) -> Result<(), Error> {
    std::fs::create_dir_all(dir)?;

    for (name, commands) in DEFAULT_TEXT_CATEGORIES {
        let mut content = commands.join("\n");
        content.push('\n');
        std::fs::write(dir.join(std::format!("{name}.txt")), content)?;
    }

    let quoting = TestCategory {
        name: "quoting".into(),
        description: "Tests for shell quoting behavior".into(),
        tests: [
            ("echo \"Double $USER quotes\"", "Double quotes with expansion"),
            ("echo 'Single $USER quotes'", "Single quotes prevent expansion"),
            ("echo \"Nested 'quotes'\"", "Nested quotes"),
            ("echo 'Nested \"quotes\"'", "Nested quotes reversed"),
            ("echo \"$HOME\"'$HOME'", "Adjacent different quotes"),
        ]
        .into_iter()
        .map(|(command, description)| TestCase {
            description: description.into(),
            ..TestCase::new(command)
        })
        .collect(),
    };

    std::fs::write(
        dir.join("quoting.json"),
        serde_json::to_string_pretty(&quoting)?,
    )?;

    Ok(())
}

fn category_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn load_text(path: &Path) -> Result<TestCategory, Error> {
    let content = std::fs::read_to_string(path)?;

    let tests = content
        .lines()
        .filter(|line| !line.is_empty())
        .map(TestCase::new)
        .collect();

    Ok(TestCategory::new(category_name(path), tests))
}

fn load_json(path: &Path) -> Result<TestCategory, Error> {
    let content = std::fs::read_to_string(path)?;
    let category: TestCategory = serde_json::from_str(&content)?;
    Ok(fill_defaults(category, path))
}

fn load_yaml(path: &Path) -> Result<TestCategory, Error> {
    let content = std::fs::read_to_string(path)?;
    let category: TestCategory = serde_yaml::from_str(&content)?;
    Ok(fill_defaults(category, path))
}

fn fill_defaults(category: TestCategory, path: &Path) -> TestCategory {
    let name = if category.name.is_empty() {
        category_name(path)
    } else {
        category.name
    };

    if category.description.is_empty() {
        TestCategory::new(name, category.tests)
    } else {
        TestCategory { name, ..category }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use assert_fs::prelude::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn loads_all_formats_in_name_order() -> Result<()> {
        let temp = assert_fs::TempDir::new()?;
        temp.child("b_echo.txt")
            .write_str("echo hola\n\necho -n bonjour\n")?;
        temp.child("a_quoting.json").write_str(
            r#"{"Name": "quoting", "Description": "Quotes", "Tests": [{"Command": "echo 'x'", "Skip": true}]}"#,
        )?;
        temp.child("c_pipes.yaml").write_str(
            "name: pipes\ncases:\n  - command: \"ls | wc -l\"\n    description: count\n",
        )?;
        temp.child("notes.md").write_str("# not a test file\n")?;
        temp.child(".hidden").write_str("echo hidden\n")?;

        let categories = load_categories(temp.path())?;

        assert_eq!(
            categories,
            vec![
                TestCategory {
                    name: "quoting".into(),
                    description: "Quotes".into(),
                    tests: vec![TestCase::new("echo 'x'").skipped()],
                },
                TestCategory::new(
                    "b_echo",
                    vec![TestCase::new("echo hola"), TestCase::new("echo -n bonjour")]
                ),
                TestCategory {
                    name: "pipes".into(),
                    description: "Tests for pipes commands".into(),
                    tests: vec![TestCase {
                        description: "count".into(),
                        ..TestCase::new("ls | wc -l")
                    }],
                },
            ]
        );

        Ok(())
    }

    #[test]
    fn unparsable_file_is_skipped() -> Result<()> {
        let temp = assert_fs::TempDir::new()?;
        temp.child("broken.json").write_str("{ not json")?;
        temp.child("ok.txt").write_str("pwd\n")?;

        let categories = load_categories(temp.path())?;

        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].name, "ok");

        Ok(())
    }

    #[test]
    fn missing_dir_is_seeded() -> Result<()> {
        let temp = assert_fs::TempDir::new()?;
        let dir = temp.path().join("tests");

        let categories = load_categories(&dir)?;

        let names: Vec<_> = categories.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"echo"));
        assert!(names.contains(&"quoting"));
        assert_eq!(categories.len(), DEFAULT_TEXT_CATEGORIES.len() + 1);
        assert!(categories.iter().all(|c| !c.tests.is_empty()));

        Ok(())
    }

    #[test]
    fn selection_preserves_loaded_order() {
        let all = vec![
            TestCategory::new("echo", vec![]),
            TestCategory::new("exit", vec![]),
            TestCategory::new("pipes", vec![]),
        ];

        let selected = select_categories(all.clone(), &["pipes".into(), "echo".into()]);
        let names: Vec<_> = selected.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["echo", "pipes"]);

        assert_eq!(select_categories(all.clone(), &[]), all);
    }
}
