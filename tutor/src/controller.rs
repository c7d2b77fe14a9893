//! Action dispatch.
//!
//! One [`Action`] per process invocation. The controller owns the order of
//! collaboration: catalog, then setup, then verifier, then progress store.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::core::types::{RunMode, VerifyOutcome};
use crate::io::presenter::{MenuEntry, MenuView, Presenter};
use crate::io::setup::SetupLoader;
use crate::io::text::{RenderedText, TextKind, render_template, render_text_file};
use crate::io::verifier::Verifier;
use crate::select::select_or_current;
use crate::tutorial::Tutorial;
use crate::verify::{VerifyRequest, verify_current};

const USAGE: &str = include_str!("usage.txt");

/// Binary serving the static guide.
pub const GUIDE_BIN: &str = "tutor-guide";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Menu,
    Help,
    Server { lang: Option<String> },
    Credits,
    Prerequisites,
    Version,
    List,
    Current,
    Select { name: Option<String> },
    Verify { file: Option<PathBuf> },
    Run { file: Option<PathBuf> },
}

/// What an action produced beyond its printed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Done,
    Verified(VerifyOutcome),
}

pub struct Controller<L, V, P> {
    tutorial: Tutorial,
    loader: L,
    verifier: V,
    presenter: P,
}

impl<L, V, P> Controller<L, V, P>
where
    L: SetupLoader,
    V: Verifier,
    P: Presenter,
{
    pub fn new(tutorial: Tutorial, loader: L, verifier: V, presenter: P) -> Self {
        Self {
            tutorial,
            loader,
            verifier,
            presenter,
        }
    }

    pub fn tutorial(&self) -> &Tutorial {
        &self.tutorial
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    #[instrument(skip(self))]
    pub fn dispatch(&mut self, action: Action) -> Result<ActionOutcome> {
        match action {
            Action::Menu => self.menu()?,
            Action::Help => self.help()?,
            Action::Server { lang } => launch_guide(&self.tutorial.paths.guide_dir, lang.as_deref())?,
            Action::Credits => {
                let file = self.tutorial.config.credits_file.clone();
                self.print_optional(file.as_deref())?;
            }
            Action::Prerequisites => {
                let file = self.tutorial.config.prerequisites_file.clone();
                self.print_optional(file.as_deref())?;
            }
            Action::Version => {
                let config = &self.tutorial.config;
                self.presenter
                    .line(&format!("{}@{}", config.name, config.version));
            }
            Action::List => {
                for name in self.tutorial.catalog.list()? {
                    self.presenter.line(name);
                }
            }
            Action::Current => {
                if let Some(current) = self.tutorial.store.current() {
                    self.presenter.line(&current);
                }
            }
            Action::Select { name } => {
                select_or_current(&self.tutorial, &mut self.presenter, name.as_deref())?;
            }
            Action::Verify { file } => return self.verify(RunMode::Verify, file),
            Action::Run { file } => return self.verify(RunMode::Run, file),
        }
        Ok(ActionOutcome::Done)
    }

    fn verify(&mut self, mode: RunMode, file: Option<PathBuf>) -> Result<ActionOutcome> {
        let request = VerifyRequest {
            mode,
            submission_file: file,
        };
        let outcome = verify_current(
            &self.tutorial,
            &self.loader,
            &self.verifier,
            &mut self.presenter,
            &request,
        )?;
        Ok(ActionOutcome::Verified(outcome))
    }

    fn menu(&mut self) -> Result<()> {
        let completed = self.tutorial.store.completed();
        let entries = self
            .tutorial
            .catalog
            .list()?
            .iter()
            .map(|name| MenuEntry {
                name: name.clone(),
                completed: completed.contains(name),
            })
            .collect();
        let config = &self.tutorial.config;
        let view = MenuView {
            title: config.title().to_string(),
            subtitle: config.subtitle.clone(),
            entries,
            has_help: self.existing_file(config.help_file.as_deref()).is_some(),
            has_credits: self.existing_file(config.credits_file.as_deref()).is_some(),
            has_prerequisites: self
                .existing_file(config.prerequisites_file.as_deref())
                .is_some(),
        };
        self.presenter.menu(&view);
        Ok(())
    }

    fn help(&mut self) -> Result<()> {
        let usage = RenderedText {
            kind: TextKind::Plain,
            body: render_template(
                USAGE,
                &self.tutorial.config.name,
                &self.tutorial.paths.app_dir.to_string_lossy(),
            ),
        };
        self.presenter.text(&usage);
        let file = self.tutorial.config.help_file.clone();
        self.print_optional(file.as_deref())
    }

    /// Print a tutorial-provided text file when configured and present.
    fn print_optional(&mut self, relative: Option<&Path>) -> Result<()> {
        let Some(path) = self.existing_file(relative) else {
            return Ok(());
        };
        let text = render_text_file(
            &self.tutorial.config.name,
            &self.tutorial.paths.app_dir,
            &path,
        )?;
        self.presenter.text(&text);
        Ok(())
    }

    fn existing_file(&self, relative: Option<&Path>) -> Option<PathBuf> {
        let path = self.tutorial.paths.app_file(relative?);
        if path.is_file() {
            Some(path)
        } else {
            warn!(path = %path.display(), "configured file is missing");
            None
        }
    }
}

/// Arguments passed to the guide server.
pub fn guide_args(root: &Path, lang: Option<&str>) -> Vec<OsString> {
    let mut args = vec![OsString::from("--root"), root.as_os_str().to_owned()];
    if let Some(lang) = lang {
        args.push(OsString::from("--lang"));
        args.push(OsString::from(lang));
    }
    args
}

/// `tutor-guide` next to the running executable, else looked up on `PATH`.
fn guide_program() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(GUIDE_BIN)))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(GUIDE_BIN))
}

fn launch_guide(guide_dir: &Path, lang: Option<&str>) -> Result<()> {
    if !guide_dir.is_dir() {
        bail!("guide directory {} does not exist", guide_dir.display());
    }
    let program = guide_program();
    info!(program = %program.display(), root = %guide_dir.display(), "starting guide server");
    let status = Command::new(&program)
        .args(guide_args(guide_dir, lang))
        .status()
        .with_context(|| format!("spawn {}", program.display()))?;
    debug!(?status, "guide server exited");
    if !status.success() {
        bail!("{} exited with {status}", program.display());
    }
    Ok(())
}
