//! Construction of the submission and solution command lines.
//!
//! Everything here is pure: given a problem directory, the setup's argument
//! lists and the configured wrapper tools, produce the exact argv that will be
//! handed to the verifier.

use std::path::Path;

use anyhow::{Result, anyhow};
use serde::Deserialize;

/// A fully resolved command line (`argv[0]` is the program).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec(Vec<String>);

impl CommandSpec {
    pub fn new(argv: Vec<String>) -> Self {
        Self(argv)
    }

    pub fn argv(&self) -> &[String] {
        &self.0
    }

    /// Split into program and arguments; an empty argv is an error.
    pub fn split(&self) -> Result<(&str, &[String])> {
        let (program, args) = self
            .0
            .split_first()
            .ok_or_else(|| anyhow!("empty command line"))?;
        Ok((program.as_str(), args))
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}

/// Deprecated module-use tracking request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModUseTrack {
    /// File the tracker writes the observed module usage into.
    pub track_file: String,
    /// Modules the submission is allowed to use.
    pub modules: Vec<String>,
}

/// Wrapper programs configured by the tutorial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapTools {
    /// Program (plus leading args) every wrapped command is run through.
    pub exec_wrapper: Vec<String>,
    /// Program (plus leading args) implementing module-use tracking.
    pub module_tracker: Vec<String>,
}

/// How the submission command is wrapped, in precedence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandWrapStrategy {
    /// Deprecated: run through the module-use tracker.
    ModuleUseTracking(ModUseTrack),
    /// Run through the exec wrapper with extra wrapper arguments.
    ExecWrap(Vec<String>),
    /// Run the target directly.
    Direct,
}

impl CommandWrapStrategy {
    /// Pick the submission wrap. Module-use tracking wins over `exec_wrap`.
    pub fn for_submission(mod_use_track: Option<&ModUseTrack>, exec_wrap: Option<&[String]>) -> Self {
        if let Some(track) = mod_use_track {
            return CommandWrapStrategy::ModuleUseTracking(track.clone());
        }
        match exec_wrap {
            Some(wrap) => CommandWrapStrategy::ExecWrap(wrap.to_vec()),
            None => CommandWrapStrategy::Direct,
        }
    }

    /// The solution side only knows the general exec wrap.
    pub fn for_solution(solution_exec_wrap: Option<&[String]>) -> Self {
        match solution_exec_wrap {
            Some(wrap) => CommandWrapStrategy::ExecWrap(wrap.to_vec()),
            None => CommandWrapStrategy::Direct,
        }
    }

    /// Everything that precedes the target file.
    fn prefix(&self, tools: &WrapTools) -> Vec<String> {
        match self {
            CommandWrapStrategy::ModuleUseTracking(track) => {
                let mut prefix = tools.exec_wrapper.clone();
                prefix.extend(tools.module_tracker.iter().cloned());
                prefix.push(track.track_file.clone());
                prefix.push(track.modules.join(","));
                prefix
            }
            CommandWrapStrategy::ExecWrap(wrap) => {
                let mut prefix = tools.exec_wrapper.clone();
                prefix.extend(wrap.iter().cloned());
                prefix
            }
            CommandWrapStrategy::Direct => Vec::new(),
        }
    }
}

/// Resolve the argument list: shared `args` win over side-specific ones.
pub fn resolve_args(shared: Option<&[String]>, side: Option<&[String]>) -> Vec<String> {
    shared.or(side).map(<[String]>::to_vec).unwrap_or_default()
}

/// Build `[...wrap prefix, target, ...args]`.
pub fn build_command(
    target: &Path,
    args: &[String],
    strategy: &CommandWrapStrategy,
    tools: &WrapTools,
) -> CommandSpec {
    let mut argv = strategy.prefix(tools);
    argv.push(target.to_string_lossy().into_owned());
    argv.extend(args.iter().cloned());
    CommandSpec::new(argv)
}
