//! Running one external process under a deadline.

use std::{
    fmt::Display,
    io::Read,
    path::Path,
    process::{ExitStatus, Stdio},
    time::{Duration, Instant},
};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::Child,
    task::JoinHandle,
};

use crate::{Error, ShellConfig, trace_categories};

/// How a process finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The process exited on its own. A process killed by signal `N` reports `128 + N`.
    Code(i32),
    /// The process was still running at its deadline and was terminated.
    TimedOut,
}

impl Display for ExitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code(code) => write!(f, "{code}"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// How to capture the output streams of a process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputCapture {
    /// Capture stdout and stderr separately.
    #[default]
    Separate,
    /// Capture stdout and stderr interleaved into `stdout`, as a terminal would show them.
    Combined,
}

/// Observable result of one process execution.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    /// Exit status, or the timed-out sentinel.
    pub exit: ExitOutcome,
    /// Raw standard output (with stderr interleaved under [`OutputCapture::Combined`]).
    pub stdout: String,
    /// Raw standard error; empty under [`OutputCapture::Combined`].
    pub stderr: String,
    /// Wall-clock time from spawn to completion or termination.
    pub duration: Duration,
}

impl RunOutcome {
    /// Returns whether the process hit its deadline.
    pub const fn timed_out(&self) -> bool {
        matches!(self.exit, ExitOutcome::TimedOut)
    }
}

type OutputTask = JoinHandle<std::io::Result<Vec<u8>>>;

/// How often to check whether an interrupted process group has gone away.
const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs external processes, guaranteeing none outlives the call that started it.
#[derive(Clone, Copy, Debug)]
pub struct ProcessRunner {
    grace_period: Duration,
}

impl ProcessRunner {
    /// Creates a runner that waits `grace_period` between interrupting and killing a process
    /// that exceeded its deadline.
    pub const fn new(grace_period: Duration) -> Self {
        Self { grace_period }
    }

    /// Spawns `shell` in `working_dir`, writes `input` to its stdin and closes it, then waits
    /// for the process to finish or for `timeout` to elapse, whichever comes first.
    ///
    /// A non-zero exit status is returned as data. Failure to start the process is an error.
    /// When the deadline wins, the process (and its process group on Unix) is interrupted,
    /// then killed after the grace period, and reaped before this returns. Background jobs
    /// left in the process group by a process that exited on time are killed as well.
    pub async fn run(
        &self,
        shell: &ShellConfig,
        working_dir: &Path,
        input: &str,
        capture: OutputCapture,
        timeout: Duration,
    ) -> Result<RunOutcome, Error> {
        let mut cmd = shell.create_command(working_dir);
        cmd.stdin(Stdio::piped());

        let combined_reader = match capture {
            OutputCapture::Separate => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
                None
            }
            OutputCapture::Combined => {
                let (reader, writer) = os_pipe::pipe()?;
                let stderr_writer = writer.try_clone()?;
                cmd.stdout(writer).stderr(stderr_writer);
                Some(reader)
            }
        };

        detach_from_terminal(&mut cmd);

        tracing::debug!(target: trace_categories::PROCESS, "spawning: {cmd:?}");

        let start_time = Instant::now();
        let mut child = spawn(cmd).map_err(|source| Error::Spawn {
            program: shell.program.clone(),
            source,
        })?;
        // Recorded now: once the child is reaped, `Child::id` no longer reports it.
        let pid = child.id();

        let stdin_task = child.stdin.take().map(|mut stdin| {
            let input = input.as_bytes().to_vec();
            tokio::spawn(async move {
                // The process may exit without reading all of its input.
                if let Err(e) = stdin.write_all(&input).await {
                    tracing::debug!(target: trace_categories::PROCESS, "failed to write stdin: {e}");
                }
                // Dropping stdin here closes it, signaling end of input.
            })
        });

        let (mut stdout_task, mut stderr_task): (OutputTask, Option<OutputTask>) =
            match combined_reader {
                Some(mut reader) => (
                    tokio::task::spawn_blocking(move || {
                        let mut buf = vec![];
                        reader.read_to_end(&mut buf)?;
                        Ok(buf)
                    }),
                    None,
                ),
                None => (
                    tokio::spawn(read_to_end(child.stdout.take())),
                    Some(tokio::spawn(read_to_end(child.stderr.take()))),
                ),
            };

        let completion = async {
            let status = child.wait().await?;
            let stdout = join_output(&mut stdout_task).await?;
            let stderr = match stderr_task.as_mut() {
                Some(task) => join_output(task).await?,
                None => vec![],
            };
            Ok::<_, std::io::Error>((status, stdout, stderr))
        };

        let outcome = match tokio::time::timeout(timeout, completion).await {
            Ok(result) => {
                if let Some(pid) = pid {
                    kill_stragglers(pid);
                }

                let (status, stdout, stderr) = result?;
                RunOutcome {
                    exit: ExitOutcome::Code(exit_code(status)),
                    stdout: String::from_utf8_lossy(&stdout).to_string(),
                    stderr: String::from_utf8_lossy(&stderr).to_string(),
                    duration: start_time.elapsed(),
                }
            }
            Err(_elapsed) => {
                tracing::debug!(target: trace_categories::PROCESS, "deadline of {timeout:?} exceeded; terminating {}", shell.program.display());

                self.terminate(pid, &mut child).await?;

                stdout_task.abort();
                if let Some(task) = &stderr_task {
                    task.abort();
                }

                RunOutcome {
                    exit: ExitOutcome::TimedOut,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration: start_time.elapsed(),
                }
            }
        };

        if let Some(task) = stdin_task {
            task.abort();
        }

        Ok(outcome)
    }

    /// Interrupts the child's process group, then kills whatever is left of it once the
    /// grace period is over. Always reaps the child.
    ///
    /// The child itself may already have been reaped while a background job it started kept
    /// its output open, so the group is signaled through the pid recorded at spawn time.
    async fn terminate(&self, pid: Option<u32>, child: &mut Child) -> Result<(), Error> {
        let Some(pid) = pid else {
            let _ = child.start_kill();
            child.wait().await?;
            return Ok(());
        };

        interrupt(pid);

        let group_exited = async {
            let _ = child.wait().await;
            while group_alive(pid) {
                tokio::time::sleep(GROUP_POLL_INTERVAL).await;
            }
        };
        if tokio::time::timeout(self.grace_period, group_exited)
            .await
            .is_err()
        {
            tracing::debug!(target: trace_categories::PROCESS, "process group {pid} ignored interrupt; killing");
        }

        force_kill(pid, child);
        child.wait().await?;

        Ok(())
    }
}

fn spawn(cmd: std::process::Command) -> std::io::Result<Child> {
    // The command (and its copies of any pipe write ends) is dropped when this returns, so
    // readers observe end-of-file once the child closes its own copies.
    let mut cmd = tokio::process::Command::from(cmd);
    cmd.kill_on_drop(true).spawn()
}

async fn read_to_end<R: AsyncRead + Unpin>(reader: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![];
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

async fn join_output(task: &mut OutputTask) -> std::io::Result<Vec<u8>> {
    task.await.map_err(std::io::Error::other)?
}

fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    status.code().unwrap_or(-1)
}

#[cfg(unix)]
fn detach_from_terminal(cmd: &mut std::process::Command) {
    use std::os::unix::process::CommandExt;

    // SAFETY:
    // The child runs in a new session so that shells cannot reach /dev/tty and generate
    // tty-related signals, and so that the whole process group can be signaled on timeout.
    // setsid() performs no allocation and is safe to call between fork() and exec().
    unsafe {
        cmd.pre_exec(|| {
            let _ = nix::unistd::setsid();
            Ok(())
        })
    };
}

#[cfg(not(unix))]
fn detach_from_terminal(_cmd: &mut std::process::Command) {}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
    let Ok(raw_pid) = i32::try_from(pid) else {
        return;
    };

    // The child leads its own session, so its pid is also its process group id.
    match nix::sys::signal::killpg(nix::unistd::Pid::from_raw(raw_pid), signal) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => (),
        Err(e) => {
            tracing::debug!(target: trace_categories::PROCESS, "failed to send {signal} to group {pid}: {e}");
        }
    }
}

/// Returns whether any member of the process group led by `pid` still exists.
#[cfg(unix)]
fn group_alive(pid: u32) -> bool {
    i32::try_from(pid).is_ok_and(|raw_pid| {
        nix::sys::signal::killpg(nix::unistd::Pid::from_raw(raw_pid), None).is_ok()
    })
}

#[cfg(not(unix))]
const fn group_alive(_pid: u32) -> bool {
    false
}

/// Kills anything still running in the process group of a process that already exited.
#[cfg(unix)]
fn kill_stragglers(pid: u32) {
    signal_group(pid, nix::sys::signal::Signal::SIGKILL);
}

#[cfg(not(unix))]
const fn kill_stragglers(_pid: u32) {}

#[cfg(unix)]
fn interrupt(pid: u32) {
    signal_group(pid, nix::sys::signal::Signal::SIGINT);
}

#[cfg(not(unix))]
fn interrupt(_pid: u32) {}

#[cfg(unix)]
fn force_kill(pid: u32, child: &mut Child) {
    signal_group(pid, nix::sys::signal::Signal::SIGKILL);
    let _ = child.start_kill();
}

#[cfg(not(unix))]
fn force_kill(_pid: u32, child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    fn sh(script: &str) -> ShellConfig {
        ShellConfig::new("sh").with_args(["-c", script])
    }

    fn runner() -> ProcessRunner {
        ProcessRunner::new(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn feeds_stdin_and_captures_streams() -> Result<()> {
        let outcome = runner()
            .run(
                &ShellConfig::new("sh"),
                Path::new("."),
                "echo hola\necho oops >&2\nexit 3\n",
                OutputCapture::Separate,
                Duration::from_secs(10),
            )
            .await?;

        assert_eq!(outcome.exit, ExitOutcome::Code(3));
        assert_eq!(outcome.stdout, "hola\n");
        assert_eq!(outcome.stderr, "oops\n");

        Ok(())
    }

    #[tokio::test]
    async fn combined_capture_interleaves_streams() -> Result<()> {
        let outcome = runner()
            .run(
                &sh("echo one; echo two >&2; echo three"),
                Path::new("."),
                "",
                OutputCapture::Combined,
                Duration::from_secs(10),
            )
            .await?;

        assert_eq!(outcome.exit, ExitOutcome::Code(0));
        assert_eq!(outcome.stdout, "one\ntwo\nthree\n");
        assert_eq!(outcome.stderr, "");

        Ok(())
    }

    #[tokio::test]
    async fn signaled_exit_translates_to_status_code() -> Result<()> {
        let outcome = runner()
            .run(
                &sh("kill -TERM $$"),
                Path::new("."),
                "",
                OutputCapture::Separate,
                Duration::from_secs(10),
            )
            .await?;

        assert_eq!(outcome.exit, ExitOutcome::Code(128 + 15));
        Ok(())
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let result = runner()
            .run(
                &ShellConfig::new("/nonexistent/shelldiff-test-shell"),
                Path::new("."),
                "",
                OutputCapture::Separate,
                Duration::from_secs(1),
            )
            .await;

        assert!(matches!(result, Err(Error::Spawn { .. })));
    }

    #[tokio::test]
    async fn timeout_returns_sentinel_within_bound() -> Result<()> {
        let timeout = Duration::from_millis(300);
        let start = Instant::now();

        let outcome = runner()
            .run(
                &sh("trap '' INT; sleep 30"),
                Path::new("."),
                "",
                OutputCapture::Separate,
                timeout,
            )
            .await?;

        assert!(outcome.timed_out());
        assert!(start.elapsed() < timeout + Duration::from_millis(200) + Duration::from_secs(2));

        Ok(())
    }
}
