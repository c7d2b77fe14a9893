//! Reference solution files shown after a pass.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::{debug, instrument};

/// One solution variant, ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionFile {
    pub name: String,
    /// Fence language derived from the file extension (may be empty).
    pub language: String,
    /// File contents with every line indented by two spaces.
    pub content: String,
}

impl SolutionFile {
    /// Fenced code block handed to the presentation layer for highlighting.
    pub fn code_block(&self) -> String {
        format!("```{}\n{}\n```", self.language, self.content)
    }
}

/// Read every file in `dir` whose name matches `pattern`.
///
/// Files are read in parallel; the result follows the sorted directory listing.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn gather_solutions(dir: &Path, pattern: &Regex) -> Result<Vec<SolutionFile>> {
    let mut matches: Vec<(String, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("list {}", dir.display()))? {
        let entry = entry.with_context(|| format!("list {}", dir.display()))?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if pattern.is_match(&name) && entry.path().is_file() {
            matches.push((name, entry.path()));
        }
    }
    matches.sort_by(|a, b| a.0.cmp(&b.0));
    debug!(count = matches.len(), "solution files matched");

    thread::scope(|scope| {
        let handles: Vec<_> = matches
            .iter()
            .map(|(name, path)| scope.spawn(move || read_solution(name, path)))
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| anyhow!("solution reader thread panicked"))?
            })
            .collect()
    })
}

fn read_solution(name: &str, path: &Path) -> Result<SolutionFile> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let language = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_string();
    Ok(SolutionFile {
        name: name.to_string(),
        language,
        content: indent(&raw),
    })
}

/// Prefix every line (including the last, possibly empty one) with two spaces.
pub fn indent(text: &str) -> String {
    text.split('\n')
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
