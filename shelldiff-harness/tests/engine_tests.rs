//! End-to-end tests of the differential-execution engine.
//!
//! `/bin/sh` stands in for both the candidate and the reference shell. Differences between the
//! two sides are provoked through per-shell environment overrides or small wrapper scripts.

#![cfg(unix)]
#![cfg(test)]
#![allow(clippy::panic_in_result_fn)]

use std::time::{Duration, Instant};

use anyhow::Result;
use assert_fs::TempDir;
use pretty_assertions::assert_eq;
use shelldiff_harness::{
    Error, ExitOutcome, Mismatch, NoopObserver, RunnerConfig, SafetyConfig, ShellConfig,
    ShellRole, SuiteRunner, Tally, TestCase, TestCategory, TestExecutor, Workspace,
    discover_prompt,
};

const SIDE_VAR: &str = "SHELLDIFF_SIDE";

fn side_shell(side: &str) -> ShellConfig {
    ShellConfig::new("sh").with_env(SIDE_VAR, side)
}

fn script(body: &str) -> ShellConfig {
    ShellConfig::new("sh").with_args(["-c", body, "candidate"])
}

fn config(temp: &TempDir, candidate: ShellConfig) -> RunnerConfig {
    RunnerConfig::new(
        candidate,
        side_shell("reference"),
        Workspace::under(temp.path()),
    )
    .with_timeout(Duration::from_secs(5))
    .with_grace_period(Duration::from_millis(200))
}

fn fake_instrumentation(report: &str) -> SafetyConfig {
    let body = format!("cat >/dev/null; echo '{report}' >&2");
    SafetyConfig {
        enabled: true,
        instrumentation: ShellConfig::new("sh").with_args(["-c", body.as_str(), "instrument"]),
        timeout: Duration::from_secs(5),
        log_dir: None,
    }
}

#[tokio::test]
async fn identical_output_passes() -> Result<()> {
    let temp = TempDir::new()?;
    let config = config(&temp, side_shell("candidate"));
    let executor = TestExecutor::new(&config);

    let result = executor.execute(&TestCase::new("echo hola"), "$").await?;

    assert!(result.passed);
    assert!(result.error.is_none());
    assert_eq!(result.filesystem_diff, "");
    assert!(result.mismatches().is_empty());

    let candidate = result.candidate.as_ref().map(|run| run.output.as_str());
    let reference = result.reference.as_ref().map(|run| run.exit);
    assert_eq!(candidate, Some("hola"));
    assert_eq!(reference, Some(ExitOutcome::Code(0)));

    Ok(())
}

#[tokio::test]
async fn output_mismatch_fails_without_error() -> Result<()> {
    let temp = TempDir::new()?;
    let config = config(&temp, script("cat >/dev/null; echo bonjour"));
    let executor = TestExecutor::new(&config);

    let result = executor.execute(&TestCase::new("echo hola"), "$").await?;

    assert!(!result.passed);
    assert!(result.error.is_none());
    assert_eq!(result.mismatches(), vec![Mismatch::Output]);
    assert_eq!(
        result.candidate.as_ref().map(|run| run.output.as_str()),
        Some("bonjour")
    );
    assert_eq!(
        result.reference.as_ref().map(|run| run.output.as_str()),
        Some("hola")
    );

    Ok(())
}

#[tokio::test]
async fn exit_status_mismatch_fails() -> Result<()> {
    let temp = TempDir::new()?;
    let config = config(&temp, script("sh; exit 2"));
    let executor = TestExecutor::new(&config);

    let result = executor.execute(&TestCase::new("echo hola"), "$").await?;

    assert!(!result.passed);
    assert_eq!(result.mismatches(), vec![Mismatch::ExitStatus]);
    assert_eq!(
        result.candidate.as_ref().map(|run| run.exit),
        Some(ExitOutcome::Code(2))
    );

    Ok(())
}

#[tokio::test]
async fn stderr_tail_is_informational() -> Result<()> {
    let temp = TempDir::new()?;
    let config = config(&temp, side_shell("candidate"));
    let executor = TestExecutor::new(&config);

    let result = executor
        .execute(&TestCase::new("echo \"$SHELLDIFF_SIDE: oops\" >&2"), "$")
        .await?;

    assert!(result.passed);
    assert_eq!(
        result.candidate.as_ref().map(|run| run.stderr_tail.as_str()),
        Some("oops")
    );

    Ok(())
}

#[tokio::test]
async fn skipped_test_never_spawns() -> Result<()> {
    let temp = TempDir::new()?;
    let config = config(
        &temp,
        ShellConfig::new("/nonexistent/shelldiff-candidate"),
    );
    let executor = TestExecutor::new(&config);

    let result = executor
        .execute(&TestCase::new("echo hola").skipped(), "$")
        .await?;

    assert!(!result.passed);
    assert!(result.is_skipped());
    assert!(result.candidate.is_none());
    assert!(!config.workspace.staging_dir.exists());

    Ok(())
}

#[tokio::test]
async fn spawn_failure_is_attached_to_result() -> Result<()> {
    let temp = TempDir::new()?;
    let config = config(
        &temp,
        ShellConfig::new("/nonexistent/shelldiff-candidate"),
    );
    let executor = TestExecutor::new(&config);

    let result = executor.execute(&TestCase::new("echo hola"), "$").await?;

    assert!(!result.passed);
    assert!(matches!(result.error, Some(Error::Spawn { .. })));

    Ok(())
}

#[tokio::test]
async fn timeout_is_bounded_and_kills_candidate() -> Result<()> {
    let temp = TempDir::new()?;
    let pid_file = temp.path().join("candidate.pid");

    let timeout = Duration::from_millis(500);
    let grace_period = Duration::from_millis(200);
    let pid_path = pid_file.to_string_lossy().to_string();
    let candidate = ShellConfig::new("sh").with_args([
        "-c",
        "echo $$ > \"$0\"; trap '' INT; exec sleep 30",
        pid_path.as_str(),
    ]);
    let config = config(&temp, candidate)
        .with_timeout(timeout)
        .with_grace_period(grace_period);
    let executor = TestExecutor::new(&config);

    let start = Instant::now();
    let result = executor.execute(&TestCase::new("echo hola"), "$").await?;
    let elapsed = start.elapsed();

    assert!(!result.passed);
    assert!(matches!(
        result.error,
        Some(Error::TimedOut {
            role: ShellRole::Candidate,
            ..
        })
    ));
    assert_eq!(result.duration, timeout);
    assert_eq!(
        result.candidate.as_ref().map(|run| run.exit),
        Some(ExitOutcome::TimedOut)
    );
    assert!(result.reference.is_none());
    assert!(elapsed < timeout + grace_period + Duration::from_secs(2));

    let pid: i32 = std::fs::read_to_string(&pid_file)?.trim().parse()?;
    assert_eq!(
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None),
        Err(nix::errno::Errno::ESRCH)
    );

    Ok(())
}

/// Returns whether `pid` names a process that is still running. A killed process that its
/// new parent has not reaped yet counts as gone.
fn is_running(pid: i32) -> bool {
    if nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None)
        == Err(nix::errno::Errno::ESRCH)
    {
        return false;
    }

    #[cfg(target_os = "linux")]
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        return !stat
            .rsplit_once(") ")
            .is_some_and(|(_, fields)| fields.starts_with('Z'));
    }

    true
}

async fn assert_gone(pid: i32) {
    for _ in 0..50 {
        if !is_running(pid) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!is_running(pid), "process {pid} outlived its run");
}

fn recorded_pids(path: &std::path::Path) -> Result<Vec<i32>> {
    let mut pids = vec![];
    for line in std::fs::read_to_string(path)?.lines() {
        pids.push(line.trim().parse()?);
    }
    Ok(pids)
}

#[tokio::test]
async fn timeout_kills_background_job_holding_output() -> Result<()> {
    let temp = TempDir::new()?;
    let pid_file = temp.path().join("job.pid");

    let timeout = Duration::from_millis(500);
    let grace_period = Duration::from_millis(200);
    let config = config(&temp, side_shell("candidate"))
        .with_timeout(timeout)
        .with_grace_period(grace_period);
    let executor = TestExecutor::new(&config);

    // The shell exits right away, but the job keeps its stdout open.
    let command = format!("sleep 30 & echo $! > '{}'; echo done", pid_file.display());

    let start = Instant::now();
    let result = executor.execute(&TestCase::new(command), "$").await?;

    assert!(!result.passed);
    assert!(matches!(
        result.error,
        Some(Error::TimedOut {
            role: ShellRole::Candidate,
            ..
        })
    ));
    assert!(start.elapsed() < timeout + grace_period + Duration::from_secs(2));

    let pids = recorded_pids(&pid_file)?;
    assert_eq!(pids.len(), 1);
    for pid in pids {
        assert_gone(pid).await;
    }

    Ok(())
}

#[tokio::test]
async fn background_job_does_not_outlive_completed_run() -> Result<()> {
    let temp = TempDir::new()?;
    let pid_file = temp.path().join("jobs.pid");
    let config = config(&temp, side_shell("candidate"));
    let executor = TestExecutor::new(&config);

    let command = format!(
        "sleep 30 >/dev/null 2>&1 & echo $! >> '{}'; echo done",
        pid_file.display()
    );

    let result = executor.execute(&TestCase::new(command), "$").await?;

    assert!(result.passed);
    let pids = recorded_pids(&pid_file)?;
    assert_eq!(pids.len(), 2);
    for pid in pids {
        assert_gone(pid).await;
    }

    Ok(())
}

#[tokio::test]
async fn filesystem_side_effects_are_compared() -> Result<()> {
    let temp = TempDir::new()?;
    let config = config(&temp, side_shell("candidate"));
    let executor = TestExecutor::new(&config);

    let same = executor
        .execute(&TestCase::new("echo hola > ./outfiles/out"), "$")
        .await?;
    assert!(same.passed);
    assert_eq!(
        std::fs::read_to_string(config.workspace.candidate_dir.join("out"))?,
        "hola\n"
    );

    let different = executor
        .execute(&TestCase::new("echo $SHELLDIFF_SIDE > ./outfiles/out"), "$")
        .await?;
    assert!(!different.passed);
    assert_eq!(different.mismatches(), vec![Mismatch::Filesystem]);
    assert!(different.filesystem_diff.contains("differ"));

    let extra = executor
        .execute(
            &TestCase::new("[ \"$SHELLDIFF_SIDE\" = candidate ] && touch ./outfiles/extra"),
            "$",
        )
        .await?;
    assert!(!extra.passed);
    assert!(extra.filesystem_diff.starts_with("Only in "));
    assert!(extra.filesystem_diff.contains(": extra"));

    Ok(())
}

#[tokio::test]
async fn safety_issues_fail_only_when_enabled() -> Result<()> {
    let temp = TempDir::new()?;
    let leak_report = "==1== 8 bytes in 1 blocks are definitely lost";

    let enabled = config(&temp, side_shell("candidate"))
        .with_safety(fake_instrumentation(leak_report));
    let result = TestExecutor::new(&enabled)
        .execute(&TestCase::new("echo hola"), "$")
        .await?;
    assert!(!result.passed);
    assert!(result.has_leak);
    assert!(!result.has_unclosed_fd);
    assert_eq!(result.mismatches(), vec![Mismatch::Leak]);

    let disabled = config(&temp, side_shell("candidate")).with_safety(SafetyConfig {
        enabled: false,
        ..fake_instrumentation(leak_report)
    });
    let result = TestExecutor::new(&disabled)
        .execute(&TestCase::new("echo hola"), "$")
        .await?;
    assert!(result.passed);
    assert!(!result.has_leak);

    Ok(())
}

#[tokio::test]
async fn missing_instrumentation_is_an_error() -> Result<()> {
    let temp = TempDir::new()?;
    let config = config(&temp, side_shell("candidate")).with_safety(SafetyConfig {
        instrumentation: ShellConfig::new("/nonexistent/shelldiff-valgrind"),
        ..SafetyConfig::valgrind(None)
    });

    let result = TestExecutor::new(&config)
        .execute(&TestCase::new("echo hola"), "$")
        .await?;

    assert!(!result.passed);
    assert!(matches!(result.error, Some(Error::SafetyCheck(_))));

    Ok(())
}

#[tokio::test]
async fn category_tally_excludes_skipped() -> Result<()> {
    let temp = TempDir::new()?;
    let config = config(&temp, side_shell("candidate"));

    let mut tests = vec![TestCase::new("echo same"); 7];
    tests.extend(vec![TestCase::new("echo $SHELLDIFF_SIDE"); 2]);
    tests.push(TestCase::new("echo skipped").skipped());
    let categories = vec![TestCategory::new("mixed", tests)];

    let runner = SuiteRunner::new(TestExecutor::new(&config));
    let results = runner.run(&categories, "$", &mut NoopObserver).await;

    assert_eq!(
        results.category_tally("mixed"),
        Some(Tally {
            passed: 7,
            failed: 2,
            skipped: 1
        })
    );
    let rate = results.tally().pass_rate().unwrap_or_default();
    assert!((rate - 700.0 / 9.0).abs() < 1e-9);
    assert_eq!(results.exit_status(), 1);

    Ok(())
}

#[tokio::test]
async fn setup_error_aborts_category() -> Result<()> {
    let temp = TempDir::new()?;
    let blocker = temp.path().join("not-a-dir");
    std::fs::write(&blocker, "")?;

    let mut config = config(&temp, side_shell("candidate"));
    config.workspace.staging_dir = blocker.join("outfiles");

    let categories = vec![TestCategory::new("echo", vec![TestCase::new("echo hola")])];
    let runner = SuiteRunner::new(TestExecutor::new(&config));
    let results = runner.run(&categories, "$", &mut NoopObserver).await;

    assert!(results.categories.is_empty());
    assert_eq!(results.aborted_categories, vec![String::from("echo")]);
    assert_eq!(results.exit_status(), 1);

    Ok(())
}

#[tokio::test]
async fn discovered_prompt_filters_echo() -> Result<()> {
    let temp = TempDir::new()?;

    // Mimics an interactive shell reading from a pipe: echoes a prompt and each command line.
    let candidate = script(
        r#"while IFS= read -r line; do printf 'mini$ %s\n' "$line"; eval "$line"; done; printf 'mini$ exit\nexit\n'"#,
    );
    let config = config(&temp, candidate);
    let executor = TestExecutor::new(&config);

    let prompt = discover_prompt(
        executor.runner(),
        &config.candidate,
        temp.path(),
        config.timeout,
    )
    .await;
    assert_eq!(prompt, "mini$");

    let result = executor.execute(&TestCase::new("echo hola"), &prompt).await?;
    assert!(result.passed);

    Ok(())
}
