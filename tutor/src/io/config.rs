//! Tutorial configuration stored in `<app-dir>/tutorial.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::command::WrapTools;

pub const CONFIG_FILE: &str = "tutorial.toml";

/// Tutorial configuration (TOML).
///
/// Written by tutorial authors. Only `name` is required; everything else
/// falls back to the layout most tutorials use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TutorialConfig {
    /// Short command name. Also names the learner's data directory.
    pub name: String,

    pub title: String,

    pub subtitle: Option<String>,

    /// Version printed by `version`.
    pub version: String,

    /// Column width used for banners and separators.
    pub width: usize,

    /// Problem manifest (JSON array of names), relative to the app dir.
    pub menu: PathBuf,

    /// Directory holding one subdirectory per problem.
    pub problems_dir: PathBuf,

    pub help_file: Option<PathBuf>,

    pub credits_file: Option<PathBuf>,

    pub prerequisites_file: Option<PathBuf>,

    /// Static guide served by `server`.
    pub guide_dir: PathBuf,

    pub verify: VerifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VerifyConfig {
    /// Reference solution entry point inside each problem directory.
    pub solution_entry: String,

    /// Default submission entry point inside each problem directory.
    pub submission_entry: String,

    /// Files in the problem directory shown to the learner after a pass.
    pub solution_pattern: String,

    /// Command wrapped invocations run through (e.g. `["env"]`).
    pub exec_wrapper: Vec<String>,

    /// Legacy module-use tracker command.
    pub module_tracker: Vec<String>,

    /// Kill verification processes after this many seconds. Unset waits forever.
    pub timeout_secs: Option<u64>,

    /// Truncate captured stdout beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            solution_entry: "solution".to_string(),
            submission_entry: "verify".to_string(),
            solution_pattern: "^solution.*".to_string(),
            exec_wrapper: vec!["env".to_string()],
            module_tracker: vec!["module-use-tracker".to_string()],
            timeout_secs: None,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for TutorialConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            title: String::new(),
            subtitle: None,
            version: "0.0.0".to_string(),
            width: 65,
            menu: PathBuf::from("menu.json"),
            problems_dir: PathBuf::from("problems"),
            help_file: None,
            credits_file: None,
            prerequisites_file: None,
            guide_dir: PathBuf::from("guide"),
            verify: VerifyConfig::default(),
        }
    }
}

impl TutorialConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("name must be a non-empty string"));
        }
        if self.name.contains(['/', '\\']) || self.name == "." || self.name == ".." {
            return Err(anyhow!("name must not contain path separators"));
        }
        if self.width == 0 {
            return Err(anyhow!("width must be > 0"));
        }
        self.verify.validate()
    }

    pub fn title(&self) -> &str {
        if self.title.is_empty() { &self.name } else { &self.title }
    }
}

impl VerifyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.solution_entry.trim().is_empty() {
            return Err(anyhow!("verify.solution_entry must be non-empty"));
        }
        if self.submission_entry.trim().is_empty() {
            return Err(anyhow!("verify.submission_entry must be non-empty"));
        }
        Regex::new(&self.solution_pattern).context("verify.solution_pattern is not a valid regex")?;
        if self.exec_wrapper.is_empty() || self.exec_wrapper[0].trim().is_empty() {
            return Err(anyhow!("verify.exec_wrapper must be a non-empty array"));
        }
        if self.module_tracker.is_empty() || self.module_tracker[0].trim().is_empty() {
            return Err(anyhow!("verify.module_tracker must be a non-empty array"));
        }
        if self.timeout_secs == Some(0) {
            return Err(anyhow!("verify.timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("verify.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn wrap_tools(&self) -> WrapTools {
        WrapTools {
            exec_wrapper: self.exec_wrapper.clone(),
            module_tracker: self.module_tracker.clone(),
        }
    }

    pub fn solution_regex(&self) -> Result<Regex> {
        Regex::new(&self.solution_pattern).context("compile verify.solution_pattern")
    }
}

/// Load `tutorial.toml` from `app_dir`.
pub fn load_config(app_dir: &Path) -> Result<TutorialConfig> {
    let path = app_dir.join(CONFIG_FILE);
    debug!(path = %path.display(), "loading tutorial config");
    let contents = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cfg: TutorialConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid {}", path.display()))?;
    Ok(cfg)
}

/// Canonical locations for one tutorial and one learner.
#[derive(Debug, Clone)]
pub struct TutorialPaths {
    pub app_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub problems_dir: PathBuf,
    pub guide_dir: PathBuf,
    /// Learner progress documents live here.
    pub data_dir: PathBuf,
}

impl TutorialPaths {
    /// Resolve paths; `data_dir` defaults to `$HOME/.config/<name>`.
    pub fn resolve(
        app_dir: impl Into<PathBuf>,
        cfg: &TutorialConfig,
        data_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let app_dir = app_dir.into();
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => default_data_dir(&cfg.name)?,
        };
        Ok(Self {
            manifest_path: app_dir.join(&cfg.menu),
            problems_dir: app_dir.join(&cfg.problems_dir),
            guide_dir: app_dir.join(&cfg.guide_dir),
            app_dir,
            data_dir,
        })
    }

    /// Resolve a tutorial-relative file (help, credits, ...).
    pub fn app_file(&self, relative: &Path) -> PathBuf {
        self.app_dir.join(relative)
    }
}

fn default_data_dir(name: &str) -> Result<PathBuf> {
    let home = dirs::home_dir().context("Failed to determine home directory")?;
    Ok(home.join(".config").join(name))
}
