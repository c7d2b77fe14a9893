//! Loading instructional text (problem statements, help, credits).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::{debug, warn};

/// How the presentation layer should treat a text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Markdown,
    Plain,
}

/// Text with template variables already substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedText {
    pub kind: TextKind,
    pub body: String,
}

/// Read `path` and substitute `appname` / `rootdir`.
///
/// Both `{{ appname }}` and the older `{appname}` spelling are accepted.
pub fn render_text_file(app_name: &str, app_dir: &Path, path: &Path) -> Result<RenderedText> {
    debug!(path = %path.display(), "rendering text");
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let kind = match path.extension().and_then(|ext| ext.to_str()) {
        Some("md" | "markdown") => TextKind::Markdown,
        _ => TextKind::Plain,
    };
    Ok(RenderedText {
        kind,
        body: render_template(&raw, app_name, &app_dir.to_string_lossy()),
    })
}

/// Substitute `appname` / `rootdir` in an in-memory template.
///
/// minijinja runs first so `{{appname}}` is never mistaken for the legacy
/// `{appname}` spelling.
pub fn render_template(raw: &str, app_name: &str, root_dir: &str) -> String {
    let env = Environment::new();
    let rendered = match env.render_str(raw, context! { appname => app_name, rootdir => root_dir }) {
        Ok(rendered) => rendered,
        Err(err) => {
            // Texts are free-form markdown and may legitimately contain braces.
            warn!(err = %err, "text is not a valid template, printing verbatim");
            raw.to_string()
        }
    };
    rendered
        .replace("{appname}", app_name)
        .replace("{rootdir}", root_dir)
}

/// Problem statement: `problem.md` when present, else `problem.txt`.
pub fn problem_text_path(problem_dir: &Path) -> PathBuf {
    let markdown = problem_dir.join("problem.md");
    if markdown.exists() {
        markdown
    } else {
        problem_dir.join("problem.txt")
    }
}
