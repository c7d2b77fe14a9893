//! Problem catalog loaded from the tutorial's manifest.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;
use tracing::debug;

use crate::core::problem::problem_dir_name;

const MENU_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/menu.schema.json"
));

/// Ordered problem names plus the directory layout they map onto.
///
/// The manifest is read on first access and cached for the lifetime of the
/// catalog.
#[derive(Debug)]
pub struct Catalog {
    manifest_path: PathBuf,
    problems_dir: PathBuf,
    problems: OnceLock<Vec<String>>,
}

impl Catalog {
    pub fn new(manifest_path: impl Into<PathBuf>, problems_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            problems_dir: problems_dir.into(),
            problems: OnceLock::new(),
        }
    }

    /// Catalog with an already-known problem list (no manifest read).
    pub fn with_problems(problems: Vec<String>, problems_dir: impl Into<PathBuf>) -> Self {
        let catalog = Self::new(PathBuf::new(), problems_dir);
        let _ = catalog.problems.set(problems);
        catalog
    }

    /// Problem names in manifest order.
    pub fn list(&self) -> Result<&[String]> {
        if let Some(problems) = self.problems.get() {
            return Ok(problems);
        }
        let loaded = load_manifest(&self.manifest_path)?;
        Ok(self.problems.get_or_init(|| loaded))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.list()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.list()?.is_empty())
    }

    /// Directory holding a problem's files. Does not check catalog membership.
    pub fn directory_for(&self, name: &str) -> PathBuf {
        self.problems_dir.join(problem_dir_name(name))
    }
}

/// Read and validate the manifest (JSON array of unique, non-empty names).
pub fn load_manifest(path: &Path) -> Result<Vec<String>> {
    debug!(path = %path.display(), "loading problem manifest");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read manifest {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse manifest {}", path.display()))?;
    validate_manifest(&value).with_context(|| format!("validate manifest {}", path.display()))?;
    let problems: Vec<String> = serde_json::from_value(value)
        .with_context(|| format!("deserialize manifest {}", path.display()))?;
    debug!(count = problems.len(), "manifest loaded");
    Ok(problems)
}

fn validate_manifest(manifest: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(MENU_SCHEMA).context("parse menu schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(manifest) {
        let messages = compiled
            .iter_errors(manifest)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "manifest schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}
