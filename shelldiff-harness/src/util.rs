//! Text helpers shared by the engine and the reporting layer.

/// Maximum length of a file name derived from a command line.
const MAX_FILE_NAME_LEN: usize = 50;

/// Truncates `s` to roughly `max_len` characters, appending `...` when anything was cut.
///
/// Multi-line text is cut at a line boundary when possible. Lengths are counted in characters,
/// never splitting a multi-byte character.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_owned();
    }

    if max_len <= 10 {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        return kept + "...";
    }

    // Leave room for the trailing ellipsis.
    let budget = max_len - 5;

    let mut result = String::new();
    let mut length = 0;

    for (i, line) in s.split('\n').enumerate() {
        let line_len = line.chars().count();

        if length + line_len + 1 > budget {
            if i == 0 {
                result.extend(line.chars().take(budget));
                result.push_str("...");
            } else {
                result.push_str("\n...");
            }
            break;
        }

        if i > 0 {
            result.push('\n');
            length += 1;
        }
        result.push_str(line);
        length += line_len;
    }

    result
}

/// Formats possibly multi-line output for display under a heading.
///
/// Single-line (or empty) output is returned as is. Otherwise the result is headed by `prefix`
/// and the line count, and the body is truncated to `max_len` characters.
pub fn format_output_for_display(output: &str, max_len: usize, prefix: &str) -> String {
    let output = output.trim_end_matches('\n');

    let line_count = if output.is_empty() {
        0
    } else {
        output.split('\n').count()
    };

    if line_count <= 1 {
        return output.to_owned();
    }

    let truncated = truncate_string(output, max_len);
    if truncated == output {
        format!("{prefix} ({line_count} lines):\n{truncated}")
    } else {
        format!("{prefix} ({line_count} lines, truncated):\n{truncated}")
    }
}

/// Derives a safe file name from a command line: ASCII alphanumerics are kept, everything else
/// becomes `_`, and the result is capped at 50 characters.
pub fn sanitize_file_name(command: &str) -> String {
    command
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(MAX_FILE_NAME_LEN)
        .collect()
}

/// Returns the number of lines in `text`, counting an empty string as zero lines.
pub fn line_count(text: &str) -> usize {
    if text.is_empty() {
        0
    } else {
        text.split('\n').count()
    }
}

/// Writes a colorized line diff between two strings to a writer.
pub fn write_diff(
    writer: &mut impl std::io::Write,
    indent: usize,
    left: &str,
    right: &str,
) -> std::io::Result<()> {
    use colored::Colorize;

    let indent_str = " ".repeat(indent);

    for d in diff::lines(left, right) {
        let formatted = match d {
            diff::Result::Left(l) => std::format!("{indent_str}- {l}").red(),
            diff::Result::Both(l, _) => std::format!("{indent_str}  {l}").bright_black(),
            diff::Result::Right(r) => std::format!("{indent_str}+ {r}").green(),
        };

        writeln!(writer, "{formatted}")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn short_strings_are_untouched() {
        assert_eq!(truncate_string("hola", 10), "hola");
        assert_eq!(truncate_string("", 0), "");
    }

    #[test]
    fn tiny_limits_cut_mid_string() {
        assert_eq!(truncate_string("abcdefghijklmnop", 8), "abcde...");
    }

    #[test]
    fn long_text_cut_at_line_boundary() {
        assert_eq!(
            truncate_string("line1\nline2\nline3", 14),
            "line1\n..."
        );
        assert_eq!(
            truncate_string("abcdefghijklmnopqrst", 15),
            "abcdefghij..."
        );
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_string("ééééé", 4), "é...");
    }

    #[test]
    fn display_formatting_counts_lines() {
        assert_eq!(format_output_for_display("one\n", 100, "out"), "one");
        assert_eq!(
            format_output_for_display("a\nb\nc\nd\n", 100, "out"),
            "out (4 lines):\na\nb\nc\nd"
        );
        assert_eq!(
            format_output_for_display("line1\nline2\nline3", 14, "out"),
            "out (3 lines, truncated):\nline1\n..."
        );
    }

    #[test]
    fn file_names_are_sanitized_and_capped() {
        assert_eq!(sanitize_file_name("echo hola > out"), "echo_hola___out");
        assert_eq!(sanitize_file_name(&"x".repeat(80)).len(), 50);
        assert_eq!(sanitize_file_name("é"), "_");
    }

    #[test]
    fn diff_marks_changed_lines() -> std::io::Result<()> {
        colored::control::set_override(false);

        let mut buf = vec![];
        write_diff(&mut buf, 2, "same\nold", "same\nnew")?;

        assert_eq!(
            String::from_utf8_lossy(&buf),
            "    same\n  - old\n  + new\n"
        );

        Ok(())
    }
}
