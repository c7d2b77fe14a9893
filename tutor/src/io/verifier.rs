//! Verifier abstraction: runs submission and solution and decides pass/fail.
//!
//! The [`Verifier`] trait decouples verification orchestration from how the two
//! programs are actually executed and compared. [`ProcessVerifier`] spawns
//! local processes and compares stdout; tests use scripted verifiers that emit
//! predetermined events without spawning anything.

use std::io::{self, Read, Write};
use std::process::{Child, Stdio};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use colored::Colorize;
use tracing::{debug, error, info, instrument, warn};

use crate::core::command::CommandSpec;
use crate::core::types::{Outcome, RunMode, VerifierEvent};
use crate::io::config::VerifyConfig;
use crate::io::process::{join_output, read_stream_limited, spawn_with_stdin, wait_until};

/// A readable handle standing in for a process's stdout (or for stdin).
pub type StreamSource = Box<dyn Read + Send>;

/// Writable end of a verifier session; bytes written reach the programs' stdin.
pub type SessionInput = Box<dyn Write + Send>;

/// What one side of a verification produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapturedOutput {
    pub stdout: Vec<u8>,
    /// Exit status was success (always true for pre-supplied streams).
    pub success: bool,
    pub timed_out: bool,
    /// Bytes read past the output limit and dropped from `stdout`.
    pub truncated: usize,
}

impl CapturedOutput {
    /// Default comparison: byte-equal stdout, neither side cut off.
    ///
    /// Truncated output cannot prove equality, so it never passes.
    pub fn matches(&self, expected: &CapturedOutput) -> bool {
        !self.timed_out
            && self.truncated == 0
            && expected.truncated == 0
            && self.stdout == expected.stdout
    }
}

/// Custom comparison: `(submission, solution) -> passed`.
pub type Comparator = Arc<dyn Fn(&CapturedOutput, &CapturedOutput) -> bool + Send + Sync>;

/// Options for one verifier session.
#[derive(Default)]
pub struct VerifyOptions {
    /// Pre-supplied submission output; no submission process is spawned.
    pub a: Option<StreamSource>,
    /// Pre-supplied solution output; no solution process is spawned.
    pub b: Option<StreamSource>,
    /// Long-running output: report the full listing on mismatch.
    pub long: bool,
    pub mode: RunMode,
    pub custom: Option<Comparator>,
}

/// Abstraction over verification backends.
pub trait Verifier {
    /// Start a session.
    ///
    /// Must return promptly. The session reports through `events`: exactly one
    /// [`VerifierEvent::Completed`], then [`VerifierEvent::End`] once its
    /// processes are gone. Dropping `events` without a `Completed` is a fault.
    fn start(
        &self,
        submission: CommandSpec,
        solution: CommandSpec,
        options: VerifyOptions,
        events: Sender<VerifierEvent>,
    ) -> Result<SessionInput>;
}

/// Verifier that runs both sides as local processes and compares stdout.
#[derive(Debug, Clone)]
pub struct ProcessVerifier {
    timeout: Option<Duration>,
    output_limit_bytes: usize,
}

impl ProcessVerifier {
    pub fn new(config: &VerifyConfig) -> Self {
        Self {
            timeout: config.timeout_secs.map(Duration::from_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    fn deadline(&self) -> Option<Instant> {
        self.timeout.map(|t| Instant::now() + t)
    }

    fn start_verify(
        &self,
        submission: CommandSpec,
        solution: CommandSpec,
        options: VerifyOptions,
        events: Sender<VerifierEvent>,
    ) -> Result<SessionInput> {
        let mut input = TeeInput::default();
        let actual = Side::prepare(options.a, &submission, &mut input)?;
        let expected = Side::prepare(options.b, &solution, &mut input)?;
        let limit = self.output_limit_bytes;
        let deadline = self.deadline();
        let long = options.long;
        let custom = options.custom;

        thread::spawn(move || {
            let verdict = (|| -> Result<Outcome> {
                let actual = actual.capture(limit)?;
                let expected = expected.capture(limit)?;
                let actual = actual.finish(deadline)?;
                let expected = expected.finish(deadline)?;
                let passed = match &custom {
                    Some(compare) => compare(&actual, &expected),
                    None => actual.matches(&expected),
                };
                if !passed && custom.is_none() {
                    report_mismatch(&actual, &expected, long);
                }
                Ok(if passed { Outcome::Pass } else { Outcome::Fail })
            })();
            finish_session(verdict, &events);
        });

        Ok(Box::new(input))
    }

    fn start_run(
        &self,
        submission: CommandSpec,
        options: VerifyOptions,
        events: Sender<VerifierEvent>,
    ) -> Result<SessionInput> {
        let deadline = self.deadline();
        if let Some(mut stream) = options.a {
            thread::spawn(move || {
                let verdict = io::copy(&mut stream, &mut io::stdout())
                    .map(|_| Outcome::Pass)
                    .context("copy run output");
                finish_session(verdict, &events);
            });
            return Ok(Box::new(io::sink()));
        }

        let mut child = spawn_with_stdin(&submission, Stdio::inherit())?;
        let mut input = TeeInput::default();
        input.push(&mut child)?;
        thread::spawn(move || {
            let verdict = wait_until(&mut child, deadline).map(|(status, timed_out)| {
                debug!(exit_code = ?status.code(), timed_out, "run finished");
                if status.success() && !timed_out {
                    Outcome::Pass
                } else {
                    Outcome::Fail
                }
            });
            finish_session(verdict, &events);
        });
        Ok(Box::new(input))
    }
}

impl Verifier for ProcessVerifier {
    #[instrument(skip_all, fields(mode = options.mode.as_str(), submission = %submission))]
    fn start(
        &self,
        submission: CommandSpec,
        solution: CommandSpec,
        options: VerifyOptions,
        events: Sender<VerifierEvent>,
    ) -> Result<SessionInput> {
        info!("starting verifier session");
        match options.mode {
            RunMode::Run => self.start_run(submission, options, events),
            RunMode::Verify => self.start_verify(submission, solution, options, events),
        }
    }
}

fn finish_session(verdict: Result<Outcome>, events: &Sender<VerifierEvent>) {
    match verdict {
        Ok(outcome) => {
            debug!(?outcome, "verifier outcome");
            // The receiver may already be gone if the orchestrator bailed.
            let _ = events.send(VerifierEvent::Completed(outcome));
            let _ = events.send(VerifierEvent::End);
        }
        Err(err) => {
            error!(err = %format!("{err:#}"), "verifier session failed");
        }
    }
}

/// One side of a comparison before capture starts.
enum Side {
    Process(Child),
    Stream(StreamSource),
}

impl Side {
    fn prepare(stream: Option<StreamSource>, spec: &CommandSpec, input: &mut TeeInput) -> Result<Self> {
        match stream {
            Some(stream) => Ok(Side::Stream(stream)),
            None => {
                let mut child = spawn_with_stdin(spec, Stdio::piped())?;
                input.push(&mut child)?;
                Ok(Side::Process(child))
            }
        }
    }

    /// Start draining output in the background.
    fn capture(self, limit: usize) -> Result<Capture> {
        let (child, reader): (Option<Child>, StreamSource) = match self {
            Side::Process(mut child) => {
                let stdout = child
                    .stdout
                    .take()
                    .ok_or_else(|| anyhow!("stdout was not piped"))?;
                (Some(child), Box::new(stdout))
            }
            Side::Stream(stream) => (None, stream),
        };
        let handle = thread::spawn(move || read_stream_limited(reader, limit));
        Ok(Capture { child, handle })
    }
}

struct Capture {
    child: Option<Child>,
    handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>,
}

impl Capture {
    fn finish(self, deadline: Option<Instant>) -> Result<CapturedOutput> {
        let (success, timed_out) = match self.child {
            Some(mut child) => {
                let (status, timed_out) = wait_until(&mut child, deadline)?;
                (status.success(), timed_out)
            }
            None => (true, false),
        };
        let (stdout, truncated) = join_output(self.handle).context("join stdout")?;
        if truncated > 0 {
            warn!(truncated, "verifier output truncated");
        }
        Ok(CapturedOutput {
            stdout,
            success,
            timed_out,
            truncated,
        })
    }
}

/// Fans stdin out to every spawned process.
#[derive(Default)]
struct TeeInput {
    sinks: Vec<Box<dyn Write + Send>>,
}

impl TeeInput {
    fn push(&mut self, child: &mut Child) -> Result<()> {
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        self.sinks.push(Box::new(stdin));
        Ok(())
    }
}

impl Write for TeeInput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // A process that stopped reading must not starve the other one.
        self.sinks.retain_mut(|sink| match sink.write_all(buf) {
            Ok(()) => true,
            Err(err) => {
                debug!(err = %err, "dropping closed stdin");
                false
            }
        });
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        for sink in &mut self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}

fn report_mismatch(actual: &CapturedOutput, expected: &CapturedOutput, long: bool) {
    let actual_text = String::from_utf8_lossy(&actual.stdout);
    let expected_text = String::from_utf8_lossy(&expected.stdout);
    let actual_lines: Vec<&str> = actual_text.lines().collect();
    let expected_lines: Vec<&str> = expected_text.lines().collect();
    let rows = actual_lines.len().max(expected_lines.len());

    if actual.timed_out {
        println!("{}", "Your program did not finish in time.".red());
    }
    if actual.truncated > 0 || expected.truncated > 0 {
        println!("{}", "Output exceeded the comparison limit.".red());
    }

    for i in 0..rows {
        let got = actual_lines.get(i).copied();
        let want = expected_lines.get(i).copied();
        if got == want {
            if long {
                println!("{}", format!("  {}", got.unwrap_or_default()).dimmed());
            }
            continue;
        }
        println!("{} {}", "ACTUAL:  ".bold(), describe_line(got).red());
        println!("{} {}", "EXPECTED:".bold(), describe_line(want).green());
        if !long {
            break;
        }
    }
    println!();
}

fn describe_line(line: Option<&str>) -> String {
    match line {
        Some(line) => format!("{line:?}"),
        None => "(no line)".to_string(),
    }
}
