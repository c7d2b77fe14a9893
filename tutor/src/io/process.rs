//! Helpers for spawning child processes and draining their output safely.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::command::CommandSpec;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Stderr (or stdout when stderr is empty) for error messages.
    pub fn diagnostic(&self) -> String {
        let stderr = String::from_utf8_lossy(&self.stderr);
        if stderr.trim().is_empty() {
            String::from_utf8_lossy(&self.stdout).trim().to_string()
        } else {
            stderr.trim().to_string()
        }
    }
}

/// Build a `Command` from a resolved command line.
pub fn command_for(spec: &CommandSpec, workdir: Option<&Path>) -> Result<Command> {
    let (program, args) = spec.split()?;
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = workdir {
        cmd.current_dir(dir);
    }
    Ok(cmd)
}

/// Spawn `spec` with piped stdin, the given stdout, and inherited stderr.
#[instrument(skip_all, fields(command = %spec))]
pub fn spawn_with_stdin(spec: &CommandSpec, stdout: Stdio) -> Result<Child> {
    let mut cmd = command_for(spec, None)?;
    cmd.stdin(Stdio::piped()).stdout(stdout).stderr(Stdio::inherit());
    debug!("spawning child process");
    match cmd.spawn() {
        Ok(child) => Ok(child),
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            Err(e).with_context(|| format!("spawn {spec}"))
        }
    }
}

/// Wait for `child`, killing it once `deadline` passes.
///
/// Returns the exit status and whether the child was killed for time.
pub fn wait_until(child: &mut Child, deadline: Option<Instant>) -> Result<(ExitStatus, bool)> {
    let Some(deadline) = deadline else {
        let status = child.wait().context("wait for command")?;
        return Ok((status, false));
    };
    let remaining = deadline.saturating_duration_since(Instant::now());
    match child.wait_timeout(remaining).context("wait for command")? {
        Some(status) => Ok((status, false)),
        None => {
            warn!(pid = child.id(), "command timed out, killing");
            child.kill().context("kill command")?;
            let status = child.wait().context("wait command after kill")?;
            Ok((status, true))
        }
    }
}

/// Run a command to completion and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// output stored in memory (bytes beyond this are discarded while still draining the pipe).
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs()), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Option<Duration>,
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

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        child_stdin.write_all(input).context("write stdin")?;
    }

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

    let deadline = timeout.map(|t| Instant::now() + t);
    let (status, timed_out) = wait_until(&mut child, deadline)?;

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, _) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 {
        warn!(stdout_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        timed_out,
    })
}

pub fn join_output(
    handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>,
) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Drain `reader`, keeping at most `limit` bytes. Returns kept bytes and the dropped count.
pub fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_stream_limited_truncates_but_drains() {
        let input = vec![b'x'; 20_000];
        let (kept, dropped) = read_stream_limited(input.as_slice(), 100).expect("read");
        assert_eq!(kept.len(), 100);
        assert_eq!(dropped, 19_900);
    }

    #[cfg(unix)]
    #[test]
    fn run_command_captures_stdout_and_stdin() {
        let spec = CommandSpec::new(vec!["cat".to_string()]);
        let cmd = command_for(&spec, None).expect("command");
        let output = run_command_with_timeout(cmd, Some(b"hello"), None, 1000).expect("run");
        assert!(output.status.success());
        assert_eq!(output.stdout, b"hello");
        assert!(!output.timed_out);
    }

    #[cfg(unix)]
    #[test]
    fn run_command_kills_on_timeout() {
        let spec = CommandSpec::new(vec!["sleep".to_string(), "5".to_string()]);
        let cmd = command_for(&spec, None).expect("command");
        let output =
            run_command_with_timeout(cmd, None, Some(Duration::from_millis(100)), 1000)
                .expect("run");
        assert!(output.timed_out);
        assert!(!output.status.success());
    }

    #[cfg(unix)]
    #[test]
    fn diagnostic_prefers_stderr() {
        let spec = CommandSpec::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo out; echo err >&2; exit 3".to_string(),
        ]);
        let cmd = command_for(&spec, None).expect("command");
        let output = run_command_with_timeout(cmd, None, None, 1000).expect("run");
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.diagnostic(), "err");
    }
}
