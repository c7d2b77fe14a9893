//! Test-only collaborators: a scratch tutorial on disk and scripted
//! replacements for the setup loader, verifier and presenter.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::command::CommandSpec;
use crate::core::problem::problem_dir_name;
use crate::core::progress::Progress;
use crate::core::types::{FailKind, Outcome, RunMode, VerifierEvent};
use crate::io::config::CONFIG_FILE;
use crate::io::presenter::{MenuView, Presenter, ProblemFooter};
use crate::io::setup::{SETUP_FILE, SetupCallback, SetupDescriptor, SetupLoader, SetupProtocol};
use crate::io::solutions::SolutionFile;
use crate::io::store::ProgressStore;
use crate::io::text::RenderedText;
use crate::io::verifier::{SessionInput, Verifier, VerifyOptions};
use crate::tutorial::Tutorial;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Everything observable during an action, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Starting(RunMode, String),
    Passed(String),
    Solutions(Vec<String>),
    Progress(Progress),
    Failed(String, FailKind),
    SetupFailed(String),
    Banner(String),
    /// Problem text, with the `current` document as it was when printed.
    Text {
        body: String,
        current: Option<String>,
    },
    Footer(ProblemFooter),
    Menu(MenuView),
    Line(String),
    VerifierStarted,
    /// Free-form marker pushed by a test (e.g. from a close callback).
    Marker(String),
}

/// Shared, ordered event log.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn push(&self, event: Event) {
        lock(&self.0).push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        lock(&self.0).clone()
    }

    /// Position of the first event matching `pred`.
    pub fn position(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
        lock(&self.0).iter().position(pred)
    }

    pub fn marker(&self, name: &str) -> Option<usize> {
        self.position(|event| matches!(event, Event::Marker(m) if m == name))
    }
}

/// Presenter that records every call into an [`EventLog`].
#[derive(Debug, Clone, Default)]
pub struct RecordingPresenter {
    log: EventLog,
    store: Option<ProgressStore>,
}

impl RecordingPresenter {
    pub fn new(log: EventLog) -> Self {
        Self { log, store: None }
    }

    /// Record the `current` document alongside each printed text.
    pub fn with_store_snapshot(mut self, store: ProgressStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn lines(&self) -> Vec<String> {
        self.log
            .events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Line(line) => Some(line),
                _ => None,
            })
            .collect()
    }
}

impl Presenter for RecordingPresenter {
    fn starting(&mut self, mode: RunMode, problem: &str) {
        self.log.push(Event::Starting(mode, problem.to_string()));
    }

    fn passed(&mut self, problem: &str) {
        self.log.push(Event::Passed(problem.to_string()));
    }

    fn solutions(&mut self, files: &[SolutionFile]) {
        self.log.push(Event::Solutions(
            files.iter().map(|file| file.name.clone()).collect(),
        ));
    }

    fn progress(&mut self, progress: Progress) {
        self.log.push(Event::Progress(progress));
    }

    fn failed(&mut self, problem: &str, kind: FailKind) {
        self.log.push(Event::Failed(problem.to_string(), kind));
    }

    fn setup_failed(&mut self, err: &anyhow::Error) {
        self.log.push(Event::SetupFailed(format!("{err:#}")));
    }

    fn problem_banner(&mut self, problem: &str) {
        self.log.push(Event::Banner(problem.to_string()));
    }

    fn problem_footer(&mut self, footer: &ProblemFooter) {
        self.log.push(Event::Footer(footer.clone()));
    }

    fn menu(&mut self, menu: &MenuView) {
        self.log.push(Event::Menu(menu.clone()));
    }

    fn text(&mut self, text: &RenderedText) {
        let current = self.store.as_ref().and_then(ProgressStore::current);
        self.log.push(Event::Text {
            body: text.body.clone(),
            current,
        });
    }

    fn line(&mut self, line: &str) {
        self.log.push(Event::Line(line.to_string()));
    }
}

type SyncFn = Arc<dyn Fn(RunMode) -> Result<SetupDescriptor> + Send + Sync>;

enum Script {
    Sync(SyncFn),
    Async(SyncFn),
    Missing,
}

/// Setup loader returning scripted protocols and recording which
/// directories were asked for.
pub struct ScriptedSetupLoader {
    script: Script,
    loads: Mutex<Vec<PathBuf>>,
}

impl ScriptedSetupLoader {
    pub fn sync<F>(make: F) -> Self
    where
        F: Fn(RunMode) -> Result<SetupDescriptor> + Send + Sync + 'static,
    {
        Self::with_script(Script::Sync(Arc::new(make)))
    }

    /// Protocol that answers through the callback on another thread.
    pub fn deferred<F>(make: F) -> Self
    where
        F: Fn(RunMode) -> Result<SetupDescriptor> + Send + Sync + 'static,
    {
        Self::with_script(Script::Async(Arc::new(make)))
    }

    /// Async protocol whose callback reports `message` as an error.
    pub fn failing(message: &str) -> Self {
        let message = message.to_string();
        Self::deferred(move |_mode: RunMode| Err(anyhow!(message.clone())))
    }

    /// Loader for a problem without any setup unit.
    pub fn missing() -> Self {
        Self::with_script(Script::Missing)
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            loads: Mutex::new(Vec::new()),
        }
    }

    pub fn loads(&self) -> Vec<PathBuf> {
        lock(&self.loads).clone()
    }
}

impl SetupLoader for ScriptedSetupLoader {
    fn load(&self, problem_dir: &Path) -> Result<SetupProtocol> {
        lock(&self.loads).push(problem_dir.to_path_buf());
        match &self.script {
            Script::Sync(make) => {
                let make = Arc::clone(make);
                Ok(SetupProtocol::Sync(Box::new(move |mode: RunMode| make(mode))))
            }
            Script::Async(make) => {
                let make = Arc::clone(make);
                Ok(SetupProtocol::Async(Box::new(move |mode: RunMode, callback: SetupCallback| {
                    let make = Arc::clone(&make);
                    std::thread::spawn(move || callback.complete(make(mode)));
                })))
            }
            Script::Missing => Err(anyhow!("no {SETUP_FILE} in {}", problem_dir.display())),
        }
    }
}

/// What the orchestrator handed to the verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierCall {
    pub submission: CommandSpec,
    pub solution: CommandSpec,
    pub mode: RunMode,
    pub long: bool,
    pub custom: bool,
    pub supplied_a: bool,
    pub supplied_b: bool,
}

/// Verifier that spawns nothing and replays a scripted event sequence.
///
/// Events are delivered once the session's stdin is closed, the way real
/// programs finish after reading their input.
#[derive(Clone)]
pub struct ScriptedVerifier {
    script: Vec<VerifierEvent>,
    calls: Arc<Mutex<Vec<VerifierCall>>>,
    stdin: Arc<Mutex<Vec<u8>>>,
    log: Option<EventLog>,
}

impl ScriptedVerifier {
    pub fn new(script: Vec<VerifierEvent>) -> Self {
        Self {
            script,
            calls: Arc::default(),
            stdin: Arc::default(),
            log: None,
        }
    }

    /// Report `outcome`, then `End`.
    pub fn outcome(outcome: Outcome) -> Self {
        Self::new(vec![VerifierEvent::Completed(outcome), VerifierEvent::End])
    }

    /// Push [`Event::VerifierStarted`] into `log` when a session starts.
    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn calls(&self) -> Vec<VerifierCall> {
        lock(&self.calls).clone()
    }

    /// Bytes written to the session's stdin.
    pub fn stdin(&self) -> Vec<u8> {
        lock(&self.stdin).clone()
    }
}

impl Verifier for ScriptedVerifier {
    fn start(
        &self,
        submission: CommandSpec,
        solution: CommandSpec,
        options: VerifyOptions,
        events: Sender<VerifierEvent>,
    ) -> Result<SessionInput> {
        lock(&self.calls).push(VerifierCall {
            submission,
            solution,
            mode: options.mode,
            long: options.long,
            custom: options.custom.is_some(),
            supplied_a: options.a.is_some(),
            supplied_b: options.b.is_some(),
        });
        if let Some(log) = &self.log {
            log.push(Event::VerifierStarted);
        }
        Ok(Box::new(ScriptedInput {
            stdin: Arc::clone(&self.stdin),
            script: self.script.clone(),
            events,
        }))
    }
}

struct ScriptedInput {
    stdin: Arc<Mutex<Vec<u8>>>,
    script: Vec<VerifierEvent>,
    events: Sender<VerifierEvent>,
}

impl Write for ScriptedInput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.stdin).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ScriptedInput {
    fn drop(&mut self) {
        for event in self.script.drain(..) {
            if self.events.send(event).is_err() {
                break;
            }
        }
    }
}

/// A tutorial laid out in a temporary directory, with its own data dir.
pub struct TestTutorial {
    _root: TempDir,
    app_dir: PathBuf,
    data_dir: PathBuf,
}

impl TestTutorial {
    pub const NAME: &'static str = "test-tutor";

    /// Tutorial named [`Self::NAME`] with one directory per problem.
    ///
    /// Each problem gets a `problem.md` and a `solution.sh`.
    pub fn new(problems: &[&str]) -> Result<Self> {
        let root = tempfile::tempdir().context("create tutorial tempdir")?;
        let app_dir = root.path().join("app");
        let data_dir = root.path().join("data");
        fs::create_dir_all(&app_dir).context("create app dir")?;

        let tutorial = Self {
            _root: root,
            app_dir,
            data_dir,
        };
        tutorial.write_config("")?;
        let menu = serde_json::to_string_pretty(problems).context("serialize menu")?;
        tutorial.write_app_file("menu.json", &menu)?;
        for name in problems {
            tutorial.write_problem_file(
                name,
                "problem.md",
                &format!("# {name}\n\nRun `{{{{ appname }}}} verify` when done.\n"),
            )?;
            tutorial.write_problem_file(name, "solution.sh", "echo solved\n")?;
        }
        Ok(tutorial)
    }

    /// Rewrite `tutorial.toml` with the fixed name plus `extra` TOML.
    pub fn write_config(&self, extra: &str) -> Result<()> {
        self.write_app_file(
            CONFIG_FILE,
            &format!("name = \"{}\"\n{extra}", Self::NAME),
        )?;
        Ok(())
    }

    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn problem_dir(&self, name: &str) -> PathBuf {
        self.app_dir.join("problems").join(problem_dir_name(name))
    }

    pub fn write_app_file(&self, relative: &str, contents: &str) -> Result<PathBuf> {
        write_file(&self.app_dir.join(relative), contents)
    }

    pub fn write_problem_file(&self, problem: &str, relative: &str, contents: &str) -> Result<PathBuf> {
        write_file(&self.problem_dir(problem).join(relative), contents)
    }

    pub fn open(&self) -> Result<Tutorial> {
        Tutorial::open(&self.app_dir, Some(self.data_dir.clone()))
    }

    /// A fresh store over the same data directory, as a new process would see it.
    pub fn store(&self) -> Result<ProgressStore> {
        ProgressStore::open(&self.data_dir)
    }
}

fn write_file(path: &Path, contents: &str) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok(path.to_path_buf())
}
