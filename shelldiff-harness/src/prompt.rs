use std::{path::Path, time::Duration};

use crate::{OutputCapture, ProcessRunner, ShellConfig, normalize, trace_categories};

/// Prompt assumed when the candidate's prompt cannot be discovered.
pub const FALLBACK_PROMPT: &str = "$";

/// Inputs tried in order; the first yielding a non-empty first line wins.
const PROBE_INPUTS: [&str; 2] = ["\nexit\n", "\n"];

/// Discovers the interactive prompt the candidate shell prints when reading from a pipe.
///
/// The candidate is started with a trivial input and the first line of its combined output is
/// normalized. Discovery is best-effort: failures are logged and [`FALLBACK_PROMPT`] is returned.
pub async fn discover_prompt(
    runner: &ProcessRunner,
    candidate: &ShellConfig,
    working_dir: &Path,
    timeout: Duration,
) -> String {
    for input in PROBE_INPUTS {
        match runner
            .run(
                candidate,
                working_dir,
                input,
                OutputCapture::Combined,
                timeout,
            )
            .await
        {
            Ok(outcome) if outcome.timed_out() => {
                tracing::warn!("prompt discovery timed out after {timeout:?}");
            }
            Ok(outcome) => {
                let first_line = outcome.stdout.lines().next().unwrap_or_default();
                let prompt = normalize::normalize(first_line, None);
                if !prompt.is_empty() {
                    tracing::debug!(target: trace_categories::NORMALIZE, "discovered prompt: {prompt:?}");
                    return prompt;
                }
            }
            Err(e) => {
                tracing::warn!("failed to discover prompt: {e}");
                break;
            }
        }
    }

    tracing::debug!(target: trace_categories::NORMALIZE, "using fallback prompt {FALLBACK_PROMPT:?}");
    FALLBACK_PROMPT.to_owned()
}
