//! Helpers for running child processes with timeouts and bounded output.
//!
//! [`SystemRunner`] is the engine's process runner: it streams every output line to the
//! notifier as it arrives. [`run_command_with_timeout`] is the quieter variant used for
//! request/response collaborators that feed the child on stdin.

use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::types::{CommandResult, StreamKind};
use crate::io::notifier::{Event, Notifier};

/// How long to keep draining pipes after killing a timed-out child.
const KILL_GRACE: Duration = Duration::from_secs(2);
/// Longest wait honoured; larger timeouts are clamped so deadlines never overflow.
const MAX_WAIT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// One external invocation: program, arguments, working directory.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub program: &'a str,
    pub args: &'a [String],
    pub cwd: &'a Path,
}

impl fmt::Display for Invocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program)?;
        for arg in self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Abstraction over process execution so orchestration can be tested without spawning.
pub trait CommandRunner {
    /// Run to completion, forwarding output lines to `notifier` in arrival order.
    ///
    /// Never fails: spawn errors come back as a [`CommandResult`] without an exit code.
    fn run(&self, invocation: &Invocation<'_>, notifier: &dyn Notifier) -> CommandResult;
}

/// Runner that spawns real processes.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
    output_limit_bytes: usize,
}

impl SystemRunner {
    pub fn new(timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            timeout,
            output_limit_bytes,
        }
    }
}

struct Chunk {
    stream: StreamKind,
    line: Vec<u8>,
}

impl CommandRunner for SystemRunner {
    #[instrument(skip_all, fields(program = invocation.program, timeout_secs = self.timeout.as_secs()))]
    fn run(&self, invocation: &Invocation<'_>, notifier: &dyn Notifier) -> CommandResult {
        notifier.notify(Event::info(format!("Running: {invocation}")));

        let mut cmd = Command::new(invocation.program);
        cmd.args(invocation.args)
            .current_dir(invocation.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("spawning child process");
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                error!(err = %err, "failed to spawn command");
                notifier.notify(Event::log(
                    StreamKind::Stderr,
                    format!("Spawn error: {err}"),
                ));
                return CommandResult::spawn_failure(err.to_string());
            }
        };

        let (tx, rx) = mpsc::channel::<Chunk>();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            let tx = tx.clone();
            readers.push(thread::spawn(move || {
                forward_lines(stdout, StreamKind::Stdout, tx)
            }));
        }
        if let Some(stderr) = child.stderr.take() {
            let tx = tx.clone();
            readers.push(thread::spawn(move || {
                forward_lines(stderr, StreamKind::Stderr, tx)
            }));
        }
        drop(tx);

        let mut stdout = LimitedBuffer::new(self.output_limit_bytes);
        let mut stderr = LimitedBuffer::new(self.output_limit_bytes);
        let mut deadline = deadline_after(self.timeout);
        let mut timed_out = false;
        let mut abandoned = false;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(chunk) => {
                    let text = String::from_utf8_lossy(&chunk.line).into_owned();
                    match chunk.stream {
                        StreamKind::Stdout => stdout.push(&text),
                        StreamKind::Stderr => stderr.push(&text),
                    }
                    notifier.notify(Event::log(
                        chunk.stream,
                        text.trim_end_matches(['\n', '\r']),
                    ));
                }
                Err(RecvTimeoutError::Timeout) if !timed_out => {
                    warn!(
                        timeout_secs = self.timeout.as_secs(),
                        "command timed out, killing"
                    );
                    timed_out = true;
                    kill_quietly(&mut child);
                    deadline = Instant::now() + KILL_GRACE;
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!("output pipes still open after kill; abandoning readers");
                    abandoned = true;
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let status = if timed_out {
            child.wait()
        } else {
            wait_for_exit(&mut child, deadline, &mut timed_out)
        };
        let exit_code = match status {
            Ok(status) => status.code(),
            Err(err) => {
                error!(err = %err, "failed to wait for command");
                stderr.push(&format!("wait error: {err}"));
                None
            }
        };

        // Abandoned readers are blocked on pipes held open by grandchildren; leave them detached.
        if !abandoned {
            for reader in readers {
                if reader.join().is_err() {
                    warn!("output reader thread panicked");
                }
            }
        }

        if stdout.truncated > 0 || stderr.truncated > 0 {
            warn!(
                stdout_truncated = stdout.truncated,
                stderr_truncated = stderr.truncated,
                "output truncated"
            );
        }
        debug!(exit_code = ?exit_code, timed_out, "command finished");

        CommandResult {
            exit_code,
            stdout: stdout.text,
            stderr: stderr.text,
            timed_out,
            stdout_truncated: stdout.truncated,
            stderr_truncated: stderr.truncated,
        }
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    Instant::now() + timeout.min(MAX_WAIT)
}

/// Pipes can close before the process exits; give it the rest of the budget.
fn wait_for_exit(
    child: &mut Child,
    deadline: Instant,
    timed_out: &mut bool,
) -> std::io::Result<ExitStatus> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    match child.wait_timeout(remaining)? {
        Some(status) => Ok(status),
        None => {
            warn!("command outlived its output pipes past the timeout, killing");
            *timed_out = true;
            kill_quietly(child);
            child.wait()
        }
    }
}

fn kill_quietly(child: &mut Child) {
    if let Err(err) = child.kill() {
        warn!(err = %err, "failed to kill command");
    }
}

fn forward_lines<R: Read>(reader: R, stream: StreamKind, tx: Sender<Chunk>) {
    let mut reader = BufReader::new(reader);
    loop {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(Chunk { stream, line }).is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!(err = %err, ?stream, "failed to read output");
                break;
            }
        }
    }
}

struct LimitedBuffer {
    text: String,
    truncated: usize,
    limit: usize,
}

impl LimitedBuffer {
    fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            truncated: 0,
            limit,
        }
    }

    fn push(&mut self, chunk: &str) {
        let remaining = self.limit.saturating_sub(self.text.len());
        if chunk.len() <= remaining {
            self.text.push_str(chunk);
            return;
        }
        let mut keep = remaining;
        while !chunk.is_char_boundary(keep) {
            keep -= 1;
        }
        self.text.push_str(&chunk[..keep]);
        self.truncated += chunk.len() - keep;
    }
}

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

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
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

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    // Fed from its own thread so a child that never reads stdin still hits the timeout.
    let stdin_handle = match stdin {
        Some(input) => {
            let mut child_stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("stdin was not piped"))?;
            let input = input.to_vec();
            Some(thread::spawn(move || child_stdin.write_all(&input)))
        }
        None => None,
    };

    let mut timed_out = false;
    let status = match child
        .wait_timeout(timeout.min(MAX_WAIT))
        .context("wait for command")?
    {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    if let Some(handle) = stdin_handle {
        // A child that exits without reading stdin closes the pipe; its exit status tells the story.
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(err = %err, "failed to write stdin"),
            Err(_) => warn!("stdin writer thread panicked"),
        }
    }

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

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

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
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
