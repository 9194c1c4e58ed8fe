//! Helpers for running child processes that honor cancellation.

use std::io::{ErrorKind, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::cancel::{CancelToken, POLL_INTERVAL};
use crate::error::BackendError;

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
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Parameters for [`run_command`].
#[derive(Debug, Clone, Copy)]
pub struct RunOptions<'a> {
    pub stdin: Option<&'a [u8]>,
    /// Kill the child once this much time has passed. `None` waits forever.
    pub timeout: Option<Duration>,
    pub output_limit_bytes: usize,
}

impl Default for RunOptions<'_> {
    fn default() -> Self {
        Self {
            stdin: None,
            timeout: None,
            output_limit_bytes: 1_000_000,
        }
    }
}

/// Run a command, capturing stdout/stderr without risking pipe deadlocks.
///
/// The child is waited on in [`POLL_INTERVAL`] slices. If `cancel` fires in the
/// meantime the child is killed and reaped and the call fails with
/// [`BackendError::Cancelled`], so no process is left running behind the
/// caller's back.
#[instrument(
    skip_all,
    fields(program = ?cmd.get_program(), output_limit_bytes = opts.output_limit_bytes)
)]
pub fn run_command(
    mut cmd: Command,
    cancel: &CancelToken,
    opts: RunOptions<'_>,
) -> Result<CommandOutput, BackendError> {
    cancel.check()?;
    if opts.stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(BackendError::io("spawn command", e));
        }
    };

    let result = collect(&mut child, cancel, opts);
    if result.is_err()
        && let Err(e) = kill_and_reap(&mut child)
    {
        debug!(err = %e, "could not reap child after failure");
    }
    result
}

fn collect(
    child: &mut Child,
    cancel: &CancelToken,
    opts: RunOptions<'_>,
) -> Result<CommandOutput, BackendError> {
    // Written from its own thread so a child that stops reading cannot block
    // the cancellation poll below.
    let stdin_handle = match opts.stdin {
        Some(input) => {
            let mut child_stdin = child.stdin.take().ok_or_else(|| not_piped("stdin"))?;
            let input = input.to_vec();
            Some(thread::spawn(move || child_stdin.write_all(&input)))
        }
        None => None,
    };

    let stdout = child.stdout.take().ok_or_else(|| not_piped("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| not_piped("stderr"))?;

    let limit = opts.output_limit_bytes;
    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, limit));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, limit));

    let (status, timed_out) = wait_cancellable(child, cancel, opts.timeout)?;

    if let Some(handle) = stdin_handle {
        join_stdin(handle)?;
    }
    let (stdout, stdout_truncated) = join_output(stdout_handle)?;
    let (stderr, stderr_truncated) = join_output(stderr_handle)?;

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

fn wait_cancellable(
    child: &mut Child,
    cancel: &CancelToken,
    timeout: Option<Duration>,
) -> Result<(ExitStatus, bool), BackendError> {
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        let status = child
            .wait_timeout(POLL_INTERVAL)
            .map_err(|e| BackendError::io("wait for command", e))?;
        if let Some(status) = status {
            return Ok((status, false));
        }
        if cancel.is_cancelled() {
            warn!("cancellation requested, killing command");
            kill_and_reap(child)?;
            return Err(BackendError::Cancelled);
        }
        if let Some(deadline) = deadline
            && Instant::now() >= deadline
        {
            warn!(timeout_secs = ?timeout.map(|t| t.as_secs()), "command timed out, killing");
            let status = kill_and_reap(child)?;
            return Ok((status, true));
        }
    }
}

fn kill_and_reap(child: &mut Child) -> Result<ExitStatus, BackendError> {
    // The child may exit between the last poll and the kill.
    if let Err(e) = child.kill() {
        debug!(err = %e, "kill failed, child likely already exited");
    }
    child
        .wait()
        .map_err(|e| BackendError::io("wait command after kill", e))
}

fn not_piped(stream: &str) -> BackendError {
    BackendError::io(
        format!("{stream} was not piped"),
        std::io::Error::other("missing pipe"),
    )
}

fn join_stdin(handle: thread::JoinHandle<std::io::Result<()>>) -> Result<(), BackendError> {
    match handle.join() {
        Ok(Ok(())) => Ok(()),
        // The child exited without reading all of its input.
        Ok(Err(e)) if e.kind() == ErrorKind::BrokenPipe => {
            debug!("child closed stdin early");
            Ok(())
        }
        Ok(Err(e)) => Err(BackendError::io("write stdin", e)),
        Err(_) => Err(BackendError::io(
            "join stdin writer",
            std::io::Error::other("stdin writer thread panicked"),
        )),
    }
}

fn join_output(
    handle: thread::JoinHandle<std::io::Result<(Vec<u8>, usize)>>,
) -> Result<(Vec<u8>, usize), BackendError> {
    match handle.join() {
        Ok(result) => result.map_err(|e| BackendError::io("read output", e)),
        Err(_) => Err(BackendError::io(
            "join output reader",
            std::io::Error::other("output reader thread panicked"),
        )),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> std::io::Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk)?;
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
