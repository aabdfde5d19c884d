//! Child process execution with timeouts and bounded output.
//!
//! [`run_command_with_timeout`] is the low-level helper. [`CommandRunner`] is
//! the seam the sync transaction talks to: it folds every failure mode
//! (non-zero exit, timeout, spawn error) into a [`CommandOutcome`] so callers
//! branch on a flag instead of handling errors.

use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::signature::summarize;

/// How long output readers may outlive the child before the group is killed.
const READER_GRACE: Duration = Duration::from_secs(2);
const READER_POLL: Duration = Duration::from_millis(10);

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_truncated_notice(&self, label: &str) -> String {
        if self.stdout_truncated > 0 {
            format!(
                "\n[{label} stdout truncated {} bytes]\n",
                self.stdout_truncated
            )
        } else {
            String::new()
        }
    }

    pub fn stderr_truncated_notice(&self, label: &str) -> String {
        if self.stderr_truncated > 0 {
            format!(
                "\n[{label} stderr truncated {} bytes]\n",
                self.stderr_truncated
            )
        } else {
            String::new()
        }
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let started = Instant::now();

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let pid = child.id();
    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing process group"
            );
            timed_out = true;
            kill_process_group(pid);
            if let Err(err) = child.kill() {
                debug!(err = %err, "kill after group kill");
            }
            child.wait().context("wait command after kill")?
        }
    };

    // Grandchildren (hooks, ssh) can hold the pipes open after the child exits.
    let deadline = (started + timeout).max(Instant::now()) + READER_GRACE;
    if !readers_finished(&stdout_handle, &stderr_handle, deadline) {
        warn!("output pipes still open after exit, killing process group");
        kill_process_group(pid);
        readers_finished(&stdout_handle, &stderr_handle, Instant::now() + READER_GRACE);
    }

    let (stdout, stdout_truncated) = collect_output(stdout_handle, "stdout")?;
    let (stderr, stderr_truncated) = collect_output(stderr_handle, "stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

type ReaderHandle = thread::JoinHandle<Result<(Vec<u8>, usize)>>;

/// Poll both readers until they finish or `deadline` passes.
fn readers_finished(stdout: &ReaderHandle, stderr: &ReaderHandle, deadline: Instant) -> bool {
    loop {
        if stdout.is_finished() && stderr.is_finished() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(READER_POLL);
    }
}

/// Join a finished reader; detach one that is still blocked and report no output.
fn collect_output(handle: ReaderHandle, stream: &str) -> Result<(Vec<u8>, usize)> {
    if handle.is_finished() {
        return join_output(handle).with_context(|| format!("join {stream}"));
    }
    warn!(stream, "output reader still blocked, detaching it");
    Ok((Vec::new(), 0))
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(err) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        debug!(err = %err, "kill process group");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

fn join_output(handle: ReaderHandle) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

/// Flat result of one external command: did it succeed, and what did it say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    /// Stdout on success. On failure, stderr followed by any stdout text.
    pub output: String,
}

impl CommandOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// Abstraction over external command execution.
///
/// `argv[0]` is the program; the rest are its arguments. Implementations must
/// never panic or return early with an error: every failure is a
/// `CommandOutcome` with `success == false`.
pub trait CommandRunner {
    fn run(&self, argv: &[String], workdir: &Path) -> CommandOutcome;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, argv: &[String], workdir: &Path) -> CommandOutcome {
        (**self).run(argv, workdir)
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for Arc<R> {
    fn run(&self, argv: &[String], workdir: &Path) -> CommandOutcome {
        (**self).run(argv, workdir)
    }
}

/// Runner that spawns real child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
    output_limit_bytes: usize,
}

impl ProcessRunner {
    pub fn new(timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            timeout,
            output_limit_bytes,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl CommandRunner for ProcessRunner {
    #[instrument(skip_all, fields(program = argv.first().map(String::as_str).unwrap_or_default()))]
    fn run(&self, argv: &[String], workdir: &Path) -> CommandOutcome {
        let Some((program, args)) = argv.split_first() else {
            return CommandOutcome::failed("empty command line");
        };

        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(workdir);

        let output = match run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes) {
            Ok(output) => output,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "command could not run");
                return CommandOutcome::failed(format!("{}: {err:#}", argv.join(" ")));
            }
        };

        if output.timed_out {
            return CommandOutcome::failed(format!(
                "timeout: {} exceeded {}s",
                argv.join(" "),
                self.timeout.as_secs()
            ));
        }

        let stdout = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            output.stdout_truncated_notice(program)
        );
        if output.status.success() {
            return CommandOutcome::ok(stdout);
        }

        let stderr = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stderr),
            output.stderr_truncated_notice(program)
        );
        let text = failure_text(&stderr, &stdout);
        debug!(exit_code = ?output.status.code(), output = %summarize(&text, 200), "command failed");
        CommandOutcome::failed(text)
    }
}

fn failure_text(stderr: &str, stdout: &str) -> String {
    let stderr = stderr.trim_end();
    let stdout = stdout.trim_end();
    match (stderr.is_empty(), stdout.is_empty()) {
        (_, true) => stderr.to_string(),
        (true, false) => stdout.to_string(),
        (false, false) => format!("{stderr}\n{stdout}"),
    }
}
