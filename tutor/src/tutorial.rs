//! A loaded tutorial: configuration, layout, catalog and learner progress.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use crate::io::catalog::Catalog;
use crate::io::config::{TutorialConfig, TutorialPaths, load_config};
use crate::io::store::ProgressStore;

/// Everything an action needs, resolved once at startup.
#[derive(Debug)]
pub struct Tutorial {
    pub config: TutorialConfig,
    pub paths: TutorialPaths,
    pub catalog: Catalog,
    pub store: ProgressStore,
}

impl Tutorial {
    /// Load `tutorial.toml` from `app_dir` and open the learner's store.
    pub fn open(app_dir: &Path, data_dir: Option<PathBuf>) -> Result<Self> {
        let config = load_config(app_dir)?;
        Self::from_config(app_dir, config, data_dir)
    }

    pub fn from_config(
        app_dir: &Path,
        config: TutorialConfig,
        data_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let paths = TutorialPaths::resolve(app_dir, &config, data_dir)?;
        let store = ProgressStore::open(&paths.data_dir)?;
        let catalog = Catalog::new(&paths.manifest_path, &paths.problems_dir);
        debug!(
            name = %config.name,
            app_dir = %paths.app_dir.display(),
            data_dir = %paths.data_dir.display(),
            "tutorial opened"
        );
        Ok(Self {
            config,
            paths,
            catalog,
            store,
        })
    }
}
