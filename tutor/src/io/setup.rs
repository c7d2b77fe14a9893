//! Per-problem setup units.
//!
//! A setup unit tells the orchestrator how to build the submission and
//! solution commands for one attempt. Units come in two protocols, chosen
//! once at load time: synchronous units return a descriptor immediately,
//! asynchronous units deliver it later through a [`SetupCallback`].

use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::core::command::{CommandSpec, ModUseTrack};
use crate::core::types::RunMode;
use crate::io::process::{command_for, run_command_with_timeout};
use crate::io::verifier::{CapturedOutput, Comparator, StreamSource};

pub const SETUP_FILE: &str = "setup.toml";

/// Delay before the verifier starts when a setup does not ask for one.
pub const DEFAULT_WAIT: Duration = Duration::from_millis(1);

const SETUP_OUTPUT_LIMIT_BYTES: usize = 100_000;

/// Teardown hook for resources a setup opened.
pub type CloseCallback = Box<dyn FnOnce() + Send>;

/// How to run one attempt. Produced fresh for every attempt, never persisted.
pub struct SetupDescriptor {
    /// Arguments for both sides; wins over the side-specific lists.
    pub args: Option<Vec<String>>,
    pub submission_args: Option<Vec<String>>,
    pub solution_args: Option<Vec<String>>,
    pub exec_wrap: Option<Vec<String>>,
    pub solution_exec_wrap: Option<Vec<String>>,
    /// Deprecated module-use tracking; wins over `exec_wrap`.
    pub mod_use_track: Option<ModUseTrack>,
    /// Pre-supplied submission output.
    pub a: Option<StreamSource>,
    /// Pre-supplied solution output.
    pub b: Option<StreamSource>,
    /// Input fed to the verifier session.
    pub stdin: Option<StreamSource>,
    pub verify: Option<Comparator>,
    pub long: bool,
    pub hide_solutions: bool,
    pub close: Option<CloseCallback>,
    /// Delay between subscribing to the verifier and starting it.
    pub wait: Duration,
}

impl Default for SetupDescriptor {
    fn default() -> Self {
        Self {
            args: None,
            submission_args: None,
            solution_args: None,
            exec_wrap: None,
            solution_exec_wrap: None,
            mod_use_track: None,
            a: None,
            b: None,
            stdin: None,
            verify: None,
            long: false,
            hide_solutions: false,
            close: None,
            wait: DEFAULT_WAIT,
        }
    }
}

impl fmt::Debug for SetupDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupDescriptor")
            .field("args", &self.args)
            .field("submission_args", &self.submission_args)
            .field("solution_args", &self.solution_args)
            .field("exec_wrap", &self.exec_wrap)
            .field("solution_exec_wrap", &self.solution_exec_wrap)
            .field("mod_use_track", &self.mod_use_track)
            .field("a", &self.a.is_some())
            .field("b", &self.b.is_some())
            .field("stdin", &self.stdin.is_some())
            .field("verify", &self.verify.is_some())
            .field("long", &self.long)
            .field("hide_solutions", &self.hide_solutions)
            .field("close", &self.close.is_some())
            .field("wait", &self.wait)
            .finish()
    }
}

/// One-shot continuation for asynchronous setups.
///
/// Consuming `complete` guarantees the result is delivered at most once;
/// dropping the callback without completing counts as a setup error.
#[derive(Debug)]
pub struct SetupCallback {
    tx: mpsc::Sender<Result<SetupDescriptor>>,
}

impl SetupCallback {
    pub fn complete(self, result: Result<SetupDescriptor>) {
        // The resolver may have given up waiting; nothing else to do then.
        let _ = self.tx.send(result);
    }
}

pub type SyncSetup = Box<dyn Fn(RunMode) -> Result<SetupDescriptor> + Send + Sync>;
pub type AsyncSetup = Box<dyn Fn(RunMode, SetupCallback) + Send + Sync>;

/// A loaded setup unit, tagged with its calling protocol.
pub enum SetupProtocol {
    Sync(SyncSetup),
    Async(AsyncSetup),
}

impl fmt::Debug for SetupProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupProtocol::Sync(_) => f.write_str("SetupProtocol::Sync"),
            SetupProtocol::Async(_) => f.write_str("SetupProtocol::Async"),
        }
    }
}

/// Result of invoking a setup unit.
#[derive(Debug)]
pub enum SetupResolution {
    Ready(SetupDescriptor),
    /// The asynchronous setup reported an error. Nothing may be executed.
    Failed(anyhow::Error),
}

/// Invoke a setup unit and wait for its descriptor.
///
/// Synchronous errors propagate; asynchronous errors become
/// [`SetupResolution::Failed`].
pub fn resolve_setup(protocol: &SetupProtocol, mode: RunMode) -> Result<SetupResolution> {
    match protocol {
        SetupProtocol::Sync(setup) => Ok(SetupResolution::Ready(setup(mode)?)),
        SetupProtocol::Async(setup) => {
            let (tx, rx) = mpsc::channel();
            setup(mode, SetupCallback { tx });
            match rx.recv() {
                Ok(Ok(descriptor)) => Ok(SetupResolution::Ready(descriptor)),
                Ok(Err(err)) => Ok(SetupResolution::Failed(err)),
                Err(_) => Ok(SetupResolution::Failed(anyhow!(
                    "setup finished without delivering a descriptor"
                ))),
            }
        }
    }
}

/// Source of setup units, keyed by problem directory.
pub trait SetupLoader {
    fn load(&self, problem_dir: &Path) -> Result<SetupProtocol>;
}

/// Loads declarative `setup.toml` units.
#[derive(Debug, Clone, Default)]
pub struct TomlSetupLoader;

impl SetupLoader for TomlSetupLoader {
    #[instrument(skip_all, fields(problem_dir = %problem_dir.display()))]
    fn load(&self, problem_dir: &Path) -> Result<SetupProtocol> {
        let path = problem_dir.join(SETUP_FILE);
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("read setup unit {}", path.display()))?;
        let file: SetupFile =
            toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
        file.validate()
            .with_context(|| format!("invalid {}", path.display()))?;
        debug!(is_async = file.is_async, "setup unit loaded");

        let dir = problem_dir.to_path_buf();
        let file = Arc::new(file);
        if file.is_async {
            return Ok(SetupProtocol::Async(Box::new(move |mode: RunMode, callback: SetupCallback| {
                let file = Arc::clone(&file);
                let dir = dir.clone();
                thread::spawn(move || {
                    let result = file
                        .run_prepare(&dir, mode)
                        .and_then(|()| file.descriptor(&dir));
                    callback.complete(result);
                });
            })));
        }
        Ok(SetupProtocol::Sync(Box::new(move |_mode: RunMode| file.descriptor(&dir))))
    }
}

/// Built-in comparators selectable from `setup.toml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamedComparator {
    /// Both sides exit with the same success/failure status.
    ExitStatus,
    /// Stdout equal after trimming surrounding whitespace.
    Trimmed,
    /// Submission stdout contains the solution stdout.
    Contains,
}

impl NamedComparator {
    pub fn comparator(self) -> Comparator {
        match self {
            NamedComparator::ExitStatus => {
                Arc::new(|actual: &CapturedOutput, expected: &CapturedOutput| {
                    !actual.timed_out && actual.success == expected.success
                })
            }
            NamedComparator::Trimmed => {
                Arc::new(|actual: &CapturedOutput, expected: &CapturedOutput| {
                    !actual.timed_out
                        && actual.truncated == 0
                        && expected.truncated == 0
                        && actual.stdout.trim_ascii() == expected.stdout.trim_ascii()
                })
            }
            NamedComparator::Contains => {
                Arc::new(|actual: &CapturedOutput, expected: &CapturedOutput| {
                    let needle = expected.stdout.trim_ascii();
                    !actual.timed_out
                        && expected.truncated == 0
                        && (needle.is_empty()
                            || actual.stdout.windows(needle.len()).any(|w| w == needle))
                })
            }
        }
    }
}

/// On-disk form of a setup unit.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SetupFile {
    /// Marker for the asynchronous protocol.
    #[serde(rename = "async")]
    is_async: bool,
    /// Command run (in the problem dir) before an asynchronous setup completes.
    prepare: Option<Vec<String>>,
    args: Option<Vec<String>>,
    submission_args: Option<Vec<String>>,
    solution_args: Option<Vec<String>>,
    exec_wrap: Option<Vec<String>>,
    solution_exec_wrap: Option<Vec<String>>,
    mod_use_track: Option<ModUseTrack>,
    hide_solutions: bool,
    wait_millis: Option<u64>,
    long: bool,
    stdin: Option<PathBuf>,
    a: Option<PathBuf>,
    b: Option<PathBuf>,
    verify: Option<NamedComparator>,
    close: Option<Vec<String>>,
}

impl SetupFile {
    fn validate(&self) -> Result<()> {
        if self.prepare.is_some() && !self.is_async {
            bail!("prepare requires async = true");
        }
        if matches!(&self.prepare, Some(cmd) if cmd.is_empty()) {
            bail!("prepare must be a non-empty array");
        }
        if matches!(&self.close, Some(cmd) if cmd.is_empty()) {
            bail!("close must be a non-empty array");
        }
        if self.wait_millis == Some(0) {
            bail!("wait_millis must be > 0");
        }
        Ok(())
    }

    fn run_prepare(&self, dir: &Path, mode: RunMode) -> Result<()> {
        let Some(prepare) = &self.prepare else {
            return Ok(());
        };
        let spec = CommandSpec::new(prepare.clone());
        let mut cmd = command_for(&spec, Some(dir))?;
        cmd.env("TUTOR_RUN_MODE", mode.as_str());
        let output = run_command_with_timeout(cmd, None, None, SETUP_OUTPUT_LIMIT_BYTES)
            .with_context(|| format!("run prepare command `{spec}`"))?;
        if !output.status.success() {
            bail!(
                "prepare command `{spec}` exited with {:?}: {}",
                output.status.code(),
                output.diagnostic()
            );
        }
        Ok(())
    }

    fn descriptor(&self, dir: &Path) -> Result<SetupDescriptor> {
        Ok(SetupDescriptor {
            args: self.args.clone(),
            submission_args: self.submission_args.clone(),
            solution_args: self.solution_args.clone(),
            exec_wrap: self.exec_wrap.clone(),
            solution_exec_wrap: self.solution_exec_wrap.clone(),
            mod_use_track: self.mod_use_track.clone(),
            a: open_stream(dir, self.a.as_deref())?,
            b: open_stream(dir, self.b.as_deref())?,
            stdin: open_stream(dir, self.stdin.as_deref())?,
            verify: self.verify.map(NamedComparator::comparator),
            long: self.long,
            hide_solutions: self.hide_solutions,
            close: self.close.clone().map(|cmd| close_command(dir, cmd)),
            wait: self
                .wait_millis
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_WAIT),
        })
    }
}

fn open_stream(dir: &Path, relative: Option<&Path>) -> Result<Option<StreamSource>> {
    let Some(relative) = relative else {
        return Ok(None);
    };
    let path = dir.join(relative);
    let file = File::open(&path).with_context(|| format!("open {}", path.display()))?;
    Ok(Some(Box::new(file)))
}

fn close_command(dir: &Path, argv: Vec<String>) -> CloseCallback {
    let dir = dir.to_path_buf();
    Box::new(move || {
        let spec = CommandSpec::new(argv);
        let result = command_for(&spec, Some(&dir)).and_then(|cmd| {
            run_command_with_timeout(cmd, None, None, SETUP_OUTPUT_LIMIT_BYTES)
        });
        match result {
            Ok(output) if output.status.success() => debug!(command = %spec, "close command ran"),
            Ok(output) => warn!(
                command = %spec,
                exit_code = ?output.status.code(),
                "close command failed"
            ),
            Err(err) => warn!(command = %spec, err = %format!("{err:#}"), "close command failed"),
        }
    })
}
