//! Seeding error types.

use thiserror::Error;
use tilesync_core::{ConfigError, ZoneError, ZoneKind};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("config validation failed: {0}")]
    ConfigValidation(#[from] ConfigError),

    #[error(transparent)]
    Zone(#[from] ZoneError),

    #[error("selector rejected for {zone} (id {}): status `{status}`", id.as_deref().unwrap_or("*"))]
    SelectorRejected {
        zone: ZoneKind,
        id: Option<String>,
        status: String,
    },

    #[error("tile-cluster catalog drifted during refresh: added {added:?}, removed {removed:?}")]
    CatalogDrift {
        added: Vec<String>,
        removed: Vec<String>,
    },

    #[error("no baseline seed for catalog `{0}`; run a full seed first")]
    NoBaselineSeed(String),

    #[error("rendering engine failed for cluster {cluster}: {reason}")]
    EngineInvocationFailed { cluster: String, reason: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("state store error: {0}")]
    State(#[from] tilesync_state::StateError),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialize(String),
}

pub type SeedResult<T> = Result<T, SeedError>;
