pub mod seed;
pub mod status;
pub mod topology;

use std::path::PathBuf;

use anyhow::Context as _;
use tilesync_core::CatalogConfig;
use tilesync_state::StateStore;
use tracing::debug;

/// Global flags shared by every command.
pub struct Context {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub format: String,
}

impl Context {
    pub fn config_path(&self, catalog: &str) -> PathBuf {
        self.config_dir.join(format!("{catalog}.toml"))
    }

    pub fn state_path(&self, catalog: &str) -> PathBuf {
        self.data_dir.join(format!("{catalog}.redb"))
    }

    pub fn load_config(&self, catalog: &str) -> anyhow::Result<CatalogConfig> {
        let path = self.config_path(catalog);
        CatalogConfig::from_file(&path)
            .with_context(|| format!("loading catalog `{catalog}`"))
    }

    /// Open the catalog's state store. Holding it is the run lease: a
    /// second process gets `Locked` until this one exits.
    pub fn open_state(&self, catalog: &str) -> anyhow::Result<StateStore> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("creating {}", self.data_dir.display()))?;
        let path = self.state_path(catalog);
        let store = StateStore::open(&path)
            .with_context(|| format!("opening state for catalog `{catalog}`"))?;
        debug!(path = %path.display(), "state store opened");
        Ok(store)
    }

    pub fn json(&self) -> bool {
        self.format == "json"
    }
}
