//! Canonicalization of captured shell output.
//!
//! Two semantically equal outputs should compare byte-equal once normalized. Normalization
//! removes terminal control sequences and, for the candidate shell, the interactive prompt and
//! `exit` echo lines it prints when reading commands from a pipe.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::expect_used, reason = "the pattern is a constant")]
static ESCAPE_SEQUENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("valid escape pattern"));

/// Removes every ANSI control sequence of the form `ESC [ <parameters> <final letter>`.
///
/// Removal repeats until nothing matches, so fragments that only form a sequence after an
/// inner sequence is removed are stripped as well.
pub fn strip_escape_sequences(text: &str) -> String {
    let mut current = text.to_owned();
    while let Cow::Owned(stripped) = ESCAPE_SEQUENCE.replace_all(&current, "") {
        current = stripped;
    }
    current
}

/// Returns whether a line is an interactive artifact of the candidate shell rather than
/// output of the command under test.
fn is_prompt_artifact(line: &str, prompt: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with(prompt) || trimmed == "exit" || trimmed.contains("$ exit")
}

/// Normalizes captured output for comparison.
///
/// Escape sequences are always removed. If a non-empty `prompt` is given, lines beginning with
/// it (after trimming) and `exit` echo lines are dropped. The result is trimmed.
///
/// Normalization is idempotent: normalizing already-normalized text returns it unchanged.
pub fn normalize(raw: &str, prompt: Option<&str>) -> String {
    let stripped = strip_escape_sequences(raw);

    let filtered = match prompt.map(str::trim).filter(|p| !p.is_empty()) {
        Some(prompt) => Cow::Owned(
            stripped
                .lines()
                .filter(|line| !is_prompt_artifact(line, prompt))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        None => Cow::Borrowed(stripped.as_str()),
    };

    filtered.trim().to_owned()
}

/// Extracts the "relevant part" of a diagnostic message: the text after its last `:`, trimmed,
/// or the whole trimmed message if it has no colon.
///
/// This is a heuristic. Messages that legitimately contain colons (URLs, paths with drive
/// letters) lose everything up to the last one.
pub fn relevant_error_text(stderr: &str) -> String {
    match stderr.rsplit_once(':') {
        Some((_, tail)) => tail.trim().to_owned(),
        None => stderr.trim().to_owned(),
    }
}
