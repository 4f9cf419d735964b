//! Per-catalog TOML configuration.
//!
//! One file per catalog, `<config-dir>/<catalog>.toml`. Everything except
//! the database connection, the partition table and the inventory source
//! has a default.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::geometry::{BBox, DEFAULT_PADDING};
use crate::scope::{ScopeEntry, ScopeValue};
use crate::zone::ZoneKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("`sources.additional` and `database.additional_schema` must both be set or both be absent")]
    InconsistentOverrideConfig,

    #[error("`{field}` is not a valid SQL identifier: `{value}`")]
    InvalidIdentifier { field: String, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub database: DatabaseConfig,
    pub catalog: PartitionConfig,
    #[serde(default)]
    pub grid: GridConfig,
    pub sources: SourcesConfig,
    #[serde(default)]
    pub seeding: SeedingConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL, e.g. `postgres://mapproxy@db/giswater`.
    pub url: String,
    /// Schema holding selector tables and the stored procedures.
    pub schema: String,
    /// Secondary schema mirrored by selectors and used for the alternate
    /// partition.
    pub additional_schema: Option<String>,
    /// `cur_user` reported to the selector RPC.
    #[serde(default = "default_session_user")]
    pub session_user: String,
    #[serde(default = "default_lang")]
    pub lang: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Table or view listing the tile clusters.
    pub table: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_geom_column")]
    pub geom_column: String,
    /// Materialized views refreshed before the partition, in dependency order.
    #[serde(default)]
    pub materialized_views: Vec<String>,
    /// Materialized view producing the partition itself, refreshed last.
    pub partition_view: Option<String>,
    /// Scope applied before refreshing; empty means every exploitation.
    #[serde(default)]
    pub default_scope: Vec<ScopeEntryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeEntryConfig {
    pub zone: ZoneKind,
    /// Explicit ids; absent selects everything.
    pub ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridMode {
    /// One grid shared by every cluster cache.
    #[default]
    Shared,
    /// One grid per cluster, bounded by the padded cluster extent.
    PerCluster,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default)]
    pub mode: GridMode,
    #[serde(default = "default_grid_name")]
    pub name: String,
    #[serde(default = "default_crs")]
    pub srs: String,
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default = "default_resolutions")]
    pub res: Vec<f64>,
    /// Fixed extent for the shared grid; derived from the clusters when absent.
    pub bbox: Option<BBox>,
    /// Slack around cluster extents, in map units.
    #[serde(default = "default_padding")]
    pub padding: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            mode: GridMode::default(),
            name: default_grid_name(),
            srs: default_crs(),
            origin: default_origin(),
            res: default_resolutions(),
            bbox: None,
            padding: default_padding(),
        }
    }
}

/// WMS request templates, as key/value maps merged into the `req` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub inventory: BTreeMap<String, toml::Value>,
    pub additional: Option<BTreeMap<String, toml::Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FullCoverageShape {
    /// Cluster bounding box grown by the grid padding.
    #[default]
    PaddedBbox,
    /// Cluster footprint polygon as stored in the partition.
    Footprint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkPolicy {
    /// Advance to the run start once every cluster has been processed.
    #[default]
    AfterRun,
    /// Advance to the run start before the cluster loop.
    AtStart,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedingConfig {
    /// Reference system of coverages.
    #[serde(default = "default_crs")]
    pub crs: String,
    /// Tables whose `lastupdate` drives incremental seeding.
    #[serde(default)]
    pub update_tables: Vec<String>,
    /// Tracked tables for clusters routed to the additional schema.
    #[serde(default)]
    pub additional_update_tables: Vec<String>,
    /// Network zone id routed to the additional schema and source.
    #[serde(default = "default_network_sentinel")]
    pub network_sentinel: String,
    #[serde(default)]
    pub full_coverage: FullCoverageShape,
    #[serde(default)]
    pub watermark_policy: WatermarkPolicy,
    pub max_level: Option<u32>,
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    /// Seeding executable.
    #[serde(default = "default_engine")]
    pub engine: String,
}

impl Default for SeedingConfig {
    fn default() -> Self {
        Self {
            crs: default_crs(),
            update_tables: Vec::new(),
            additional_update_tables: Vec::new(),
            network_sentinel: default_network_sentinel(),
            full_coverage: FullCoverageShape::default(),
            watermark_policy: WatermarkPolicy::default(),
            max_level: None,
            concurrency: default_concurrency(),
            engine: default_engine(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Generated topology documents and footprint files.
    #[serde(default = "default_topology_dir")]
    pub topology_dir: PathBuf,
    /// Seed documents and delta geometries.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Root of the rendered tile caches.
    #[serde(default = "default_cache_base_dir")]
    pub cache_base_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            topology_dir: default_topology_dir(),
            scratch_dir: default_scratch_dir(),
            cache_base_dir: default_cache_base_dir(),
        }
    }
}

fn default_session_user() -> String {
    "mapproxy".to_string()
}
fn default_lang() -> String {
    "es_ES".to_string()
}
fn default_id_column() -> String {
    "tilecluster_id".to_string()
}
fn default_geom_column() -> String {
    "geom".to_string()
}
fn default_grid_name() -> String {
    "main_grid".to_string()
}
fn default_crs() -> String {
    "EPSG:25831".to_string()
}
fn default_origin() -> String {
    "nw".to_string()
}
fn default_resolutions() -> Vec<f64> {
    vec![
        52.9166666667,
        26.4583333333,
        13.2291666667,
        5.2916666667,
        2.6458333333,
        1.3229166667,
        0.6614583333,
        0.3307291667,
        0.1653645833,
        0.0826822917,
        0.0413411458,
    ]
}
fn default_padding() -> f64 {
    DEFAULT_PADDING
}
fn default_network_sentinel() -> String {
    "2".to_string()
}
fn default_concurrency() -> u32 {
    4
}
fn default_engine() -> String {
    "mapproxy-seed".to_string()
}
fn default_topology_dir() -> PathBuf {
    PathBuf::from("/srv/tilesync/config-out")
}
fn default_scratch_dir() -> PathBuf {
    PathBuf::from("/tmp/tilesync")
}
fn default_cache_base_dir() -> PathBuf {
    PathBuf::from("/srv/tilesync/tiles")
}

impl CatalogConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        debug!(?path, "catalog config loaded");
        Ok(config)
    }

    /// Parse and validate.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: CatalogConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks. Runs before anything touches the database.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.sources.additional.is_some() != self.database.additional_schema.is_some() {
            return Err(ConfigError::InconsistentOverrideConfig);
        }

        check_identifier("database.schema", &self.database.schema)?;
        if let Some(schema) = &self.database.additional_schema {
            check_identifier("database.additional_schema", schema)?;
        }
        check_identifier("catalog.table", &self.catalog.table)?;
        check_identifier("catalog.id_column", &self.catalog.id_column)?;
        check_identifier("catalog.geom_column", &self.catalog.geom_column)?;
        for view in &self.catalog.materialized_views {
            check_identifier("catalog.materialized_views", view)?;
        }
        if let Some(view) = &self.catalog.partition_view {
            check_identifier("catalog.partition_view", view)?;
        }

        if !self.grid.padding.is_finite() || self.grid.padding < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "grid.padding must be a non-negative number, got {}",
                self.grid.padding
            )));
        }
        if self.grid.res.is_empty() || self.grid.res.iter().any(|r| r.is_nan() || *r <= 0.0) {
            return Err(ConfigError::Invalid(
                "grid.res must list positive resolutions".to_string(),
            ));
        }
        if self.seeding.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "seeding.concurrency must be at least 1".to_string(),
            ));
        }
        self.epsg()?;
        for entry in &self.catalog.default_scope {
            if entry.ids.as_ref().is_some_and(Vec::is_empty) {
                return Err(ConfigError::Invalid(format!(
                    "catalog.default_scope entry for {} lists no ids",
                    entry.zone
                )));
            }
        }
        Ok(())
    }

    /// Numeric EPSG code of the coverage reference system.
    pub fn epsg(&self) -> ConfigResult<u32> {
        self.seeding
            .crs
            .strip_prefix("EPSG:")
            .and_then(|code| code.parse().ok())
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "seeding.crs must look like EPSG:<code>, got `{}`",
                    self.seeding.crs
                ))
            })
    }

    /// Whether a secondary partition (schema + source) is configured.
    pub fn has_secondary_partition(&self) -> bool {
        self.database.additional_schema.is_some() && self.sources.additional.is_some()
    }

    /// Scope applied before refreshing the catalog.
    pub fn default_scope(&self) -> Vec<ScopeEntry> {
        if self.catalog.default_scope.is_empty() {
            return vec![ScopeEntry::select_all(ZoneKind::Exploitation)];
        }
        self.catalog
            .default_scope
            .iter()
            .map(|entry| ScopeEntry {
                zone: entry.zone,
                value: match &entry.ids {
                    Some(ids) => ScopeValue::Ids(ids.clone()),
                    None => ScopeValue::SelectAll,
                },
            })
            .collect()
    }
}

/// Accept `name` or `schema.name`, ASCII word characters only.
fn check_identifier(field: &str, value: &str) -> ConfigResult<()> {
    let part_ok = |part: &str| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    let parts: Vec<&str> = value.split('.').collect();
    if parts.len() <= 2 && parts.iter().all(|p| part_ok(p)) {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier {
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}
