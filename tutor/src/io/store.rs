//! Durable learner progress (`<data-dir>/<document>.json`).
//!
//! Every document is replaced as a whole. Reads never fail: a missing or
//! unparsable document is reported as absent.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::core::progress::record_completion;

pub const CURRENT: &str = "current";
pub const COMPLETED: &str = "completed";

/// Key/value JSON documents under one per-tutorial data directory.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    dir: PathBuf,
}

impl ProgressStore {
    /// Open the store, creating the data directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("create data directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn document_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Read a document. Any I/O or parse error yields `None`.
    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let path = self.document_path(name);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) => {
                debug!(path = %path.display(), err = %err, "document unreadable, treating as absent");
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(path = %path.display(), err = %err, "document unparsable, treating as absent");
                None
            }
        }
    }

    /// Replace a document with `transform(current value)`.
    pub fn update<T, F>(&self, name: &str, transform: F) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> T,
    {
        let next = transform(self.read(name));
        let path = self.document_path(name);
        debug!(path = %path.display(), "writing document");
        let mut buf = serde_json::to_string_pretty(&next)
            .with_context(|| format!("serialize document {name}"))?;
        buf.push('\n');
        write_atomic(&path, &buf)
    }

    /// Name of the active problem, if one was selected.
    pub fn current(&self) -> Option<String> {
        self.read(CURRENT)
    }

    pub fn set_current(&self, name: &str) -> Result<()> {
        self.update(CURRENT, |_: Option<String>| name.to_string())
    }

    /// Completed problem names in completion order.
    pub fn completed(&self) -> Vec<String> {
        self.read(COMPLETED).unwrap_or_default()
    }

    /// Record `name` as completed (no duplicates).
    pub fn mark_completed(&self, name: &str) -> Result<()> {
        self.update(COMPLETED, |completed: Option<Vec<String>>| {
            record_completion(completed, name)
        })
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp document {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace document {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_data_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("nested").join("git-it");
        let store = ProgressStore::open(&dir).expect("open");
        assert!(dir.is_dir());
        assert_eq!(store.dir(), dir.as_path());
    }

    #[test]
    fn missing_and_corrupt_documents_read_as_absent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ProgressStore::open(temp.path()).expect("open");
        assert_eq!(store.current(), None);
        assert!(store.completed().is_empty());

        fs::write(store.document_path(COMPLETED), "[\"half").expect("write");
        assert!(store.completed().is_empty());

        fs::write(store.document_path(CURRENT), "42").expect("write");
        assert_eq!(store.current(), None);
    }

    #[test]
    fn current_is_a_bare_json_string() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ProgressStore::open(temp.path()).expect("open");
        store.set_current("Problem B").expect("set");
        let raw = fs::read_to_string(store.document_path(CURRENT)).expect("read");
        assert_eq!(raw, "\"Problem B\"\n");
    }

    #[test]
    fn selection_survives_a_fresh_store() {
        let temp = tempfile::tempdir().expect("tempdir");
        ProgressStore::open(temp.path())
            .expect("open")
            .set_current("Problem B")
            .expect("set");

        let reopened = ProgressStore::open(temp.path()).expect("reopen");
        assert_eq!(reopened.current().as_deref(), Some("Problem B"));
    }

    #[test]
    fn mark_completed_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ProgressStore::open(temp.path()).expect("open");
        store.mark_completed("One").expect("mark");
        store.mark_completed("Two").expect("mark");
        store.mark_completed("One").expect("mark");
        assert_eq!(store.completed(), vec!["One".to_string(), "Two".to_string()]);
    }

    #[test]
    fn update_over_corrupt_document_starts_from_absent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ProgressStore::open(temp.path()).expect("open");
        fs::write(store.document_path(COMPLETED), "not json").expect("write");
        store.mark_completed("One").expect("mark");
        assert_eq!(store.completed(), vec!["One".to_string()]);
        assert!(!store.dir().join("completed.json.tmp").exists());
    }
}
