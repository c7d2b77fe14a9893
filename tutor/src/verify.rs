//! Orchestration for `verify` and `run`.
//!
//! One attempt: load the active problem's setup unit, build both command
//! lines, start a verifier session and react to its outcome. A pass records
//! completion; a fail leaves progress untouched.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use anyhow::{Result, anyhow};
use tracing::{debug, error, info, instrument, warn};

use crate::core::command::{CommandSpec, CommandWrapStrategy, build_command, resolve_args};
use crate::core::progress::Progress;
use crate::core::types::{FailKind, Outcome, RunMode, VerifierEvent, VerifyOutcome};
use crate::io::config::VerifyConfig;
use crate::io::presenter::Presenter;
use crate::io::setup::{
    CloseCallback, SetupDescriptor, SetupLoader, SetupResolution, resolve_setup,
};
use crate::io::solutions::gather_solutions;
use crate::io::verifier::{SessionInput, StreamSource, Verifier, VerifyOptions};
use crate::tutorial::Tutorial;

/// `verify`/`run` was invoked before any problem was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoActiveProblemError;

impl fmt::Display for NoActiveProblemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("No active problem. Select a challenge from the menu.")
    }
}

impl std::error::Error for NoActiveProblemError {}

/// Parameters of one `verify`/`run` action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyRequest {
    pub mode: RunMode,
    /// Learner-supplied program; defaults to the problem's submission entry.
    pub submission_file: Option<PathBuf>,
}

/// Both command lines for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptCommands {
    pub submission: CommandSpec,
    pub solution: CommandSpec,
}

/// Build submission and solution commands for `descriptor`.
pub fn build_commands(
    config: &VerifyConfig,
    problem_dir: &Path,
    submission_file: Option<&Path>,
    descriptor: &SetupDescriptor,
) -> AttemptCommands {
    let tools = config.wrap_tools();

    let solution_args = resolve_args(
        descriptor.args.as_deref(),
        descriptor.solution_args.as_deref(),
    );
    let solution = build_command(
        &problem_dir.join(&config.solution_entry),
        &solution_args,
        &CommandWrapStrategy::for_solution(descriptor.solution_exec_wrap.as_deref()),
        &tools,
    );

    let target = submission_file
        .map(Path::to_path_buf)
        .unwrap_or_else(|| problem_dir.join(&config.submission_entry));
    let submission_args = resolve_args(
        descriptor.args.as_deref(),
        descriptor.submission_args.as_deref(),
    );
    let submission = build_command(
        &target,
        &submission_args,
        &CommandWrapStrategy::for_submission(
            descriptor.mod_use_track.as_ref(),
            descriptor.exec_wrap.as_deref(),
        ),
        &tools,
    );

    AttemptCommands {
        submission,
        solution,
    }
}

/// Verify (or run) the active problem.
pub fn verify_current<L, V, P>(
    tutorial: &Tutorial,
    loader: &L,
    verifier: &V,
    presenter: &mut P,
    request: &VerifyRequest,
) -> Result<VerifyOutcome>
where
    L: SetupLoader,
    V: Verifier,
    P: Presenter,
{
    let problem = tutorial.store.current().ok_or(NoActiveProblemError)?;
    verify_problem(tutorial, loader, verifier, presenter, &problem, request)
}

/// Verify (or run) `problem`.
///
/// An asynchronous setup error is reported and yields
/// [`VerifyOutcome::SetupFailed`] without executing anything.
#[instrument(skip_all, fields(problem = %problem, mode = request.mode.as_str()))]
pub fn verify_problem<L, V, P>(
    tutorial: &Tutorial,
    loader: &L,
    verifier: &V,
    presenter: &mut P,
    problem: &str,
    request: &VerifyRequest,
) -> Result<VerifyOutcome>
where
    L: SetupLoader,
    V: Verifier,
    P: Presenter,
{
    let dir = tutorial.catalog.directory_for(problem);
    let protocol = loader.load(&dir)?;
    match resolve_setup(&protocol, request.mode)? {
        SetupResolution::Ready(descriptor) => {
            let attempt = Attempt {
                problem,
                dir: &dir,
                mode: request.mode,
                submission_file: request.submission_file.as_deref(),
            };
            run_attempt(tutorial, verifier, presenter, &attempt, descriptor)
        }
        SetupResolution::Failed(err) => {
            error!(err = %format!("{err:#}"), detail = ?err, "setup failed");
            presenter.setup_failed(&err);
            Ok(VerifyOutcome::SetupFailed)
        }
    }
}

struct Attempt<'a> {
    problem: &'a str,
    dir: &'a Path,
    mode: RunMode,
    submission_file: Option<&'a Path>,
}

/// Close callback that runs at most once.
///
/// A hook dropped before it was invoked (an error cut the attempt short)
/// runs on drop, so whatever setup started is still torn down.
struct CloseHook(Option<CloseCallback>);

impl CloseHook {
    fn is_declared(&self) -> bool {
        self.0.is_some()
    }

    fn invoke(&mut self) {
        if let Some(close) = self.0.take() {
            debug!("invoking close callback");
            close();
        }
    }
}

impl Drop for CloseHook {
    fn drop(&mut self) {
        if self.0.is_some() {
            warn!("attempt ended early, running close callback");
            self.invoke();
        }
    }
}

fn run_attempt<V: Verifier, P: Presenter>(
    tutorial: &Tutorial,
    verifier: &V,
    presenter: &mut P,
    attempt: &Attempt<'_>,
    mut descriptor: SetupDescriptor,
) -> Result<VerifyOutcome> {
    presenter.starting(attempt.mode, attempt.problem);

    let commands = build_commands(
        &tutorial.config.verify,
        attempt.dir,
        attempt.submission_file,
        &descriptor,
    );
    info!(
        submission = %commands.submission,
        solution = %commands.solution,
        "starting attempt"
    );

    let fail_kind = FailKind::for_custom_verify(descriptor.verify.is_some());
    let mut close = CloseHook(descriptor.close.take());
    let teardown_on_end = attempt.mode.is_run() && close.is_declared();
    let options = VerifyOptions {
        a: descriptor.a.take(),
        b: descriptor.b.take(),
        long: descriptor.long,
        mode: attempt.mode,
        custom: descriptor.verify.clone(),
    };

    // Subscribe first; the session only starts after the setup's delay.
    let (events_tx, events_rx) = mpsc::channel();
    thread::sleep(descriptor.wait);
    let input = verifier.start(commands.submission, commands.solution, options, events_tx)?;
    pump_stdin(descriptor.stdin.take(), input);

    let mut outcome = None;
    let mut ended = false;
    for event in &events_rx {
        match event {
            VerifierEvent::Completed(result) if outcome.is_none() => {
                match result {
                    Outcome::Pass => on_pass(
                        tutorial,
                        presenter,
                        attempt,
                        descriptor.hide_solutions,
                        &mut close,
                    )?,
                    Outcome::Fail => on_fail(presenter, attempt.problem, fail_kind, &mut close),
                }
                outcome = Some(result);
            }
            VerifierEvent::Completed(result) => {
                warn!(?result, "ignoring repeated verifier outcome");
            }
            VerifierEvent::End => {
                ended = true;
                if teardown_on_end {
                    close.invoke();
                }
            }
        }
        if outcome.is_some() && (ended || !teardown_on_end) {
            break;
        }
    }

    let outcome =
        outcome.ok_or_else(|| anyhow!("verifier stopped without reporting pass or fail"))?;
    info!(?outcome, "attempt finished");
    Ok(outcome.into())
}

fn pump_stdin(stdin: Option<StreamSource>, mut input: SessionInput) {
    // Without a source, dropping `input` closes the programs' stdin.
    let Some(mut source) = stdin else {
        return;
    };
    thread::spawn(move || {
        if let Err(err) = io::copy(&mut source, &mut input) {
            debug!(err = %err, "stdin pump stopped early");
        }
    });
}

fn on_pass<P: Presenter>(
    tutorial: &Tutorial,
    presenter: &mut P,
    attempt: &Attempt<'_>,
    hide_solutions: bool,
    close: &mut CloseHook,
) -> Result<()> {
    presenter.passed(attempt.problem);

    if !hide_solutions {
        let pattern = tutorial.config.verify.solution_regex()?;
        let files = gather_solutions(attempt.dir, &pattern)?;
        presenter.solutions(&files);
    }

    tutorial.store.mark_completed(attempt.problem)?;
    let completed = tutorial.store.completed().len();
    let total = tutorial.catalog.len()?;
    presenter.progress(Progress::from_counts(total, completed));

    close.invoke();
    Ok(())
}

fn on_fail<P: Presenter>(presenter: &mut P, problem: &str, kind: FailKind, close: &mut CloseHook) {
    close.invoke();
    presenter.failed(problem, kind);
}
