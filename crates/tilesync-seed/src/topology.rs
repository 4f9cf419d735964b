//! Topology synthesis — the cache, grid, source and layer document the
//! rendering engine serves and seeds from.
//!
//! Each cluster gets a WMS source clipped to its footprint, a file cache
//! bound to a grid, and a layer. Output is ordered (clusters by id, maps
//! by key) so the same catalog state always yields the same bytes.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use tilesync_core::config::GridMode;
use tilesync_core::{BBox, CatalogConfig};
use tracing::{debug, info};

use crate::catalog::TileCluster;
use crate::coverage::{Coverage, GeometrySource};
use crate::error::{SeedError, SeedResult};
use crate::persist::{write_atomic, write_yaml};

pub const WMTS_RESTFUL_TEMPLATE: &str =
    "/tiles/{Layer}/{TileMatrixSet}/{TileMatrix}/{TileCol}/{TileRow}.{Format}";

// ── Document ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Topology {
    pub services: Services,
    pub layers: Vec<Layer>,
    pub caches: BTreeMap<String, Cache>,
    pub sources: BTreeMap<String, Source>,
    pub grids: BTreeMap<String, Grid>,
    pub globals: Globals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Services {
    pub demo: Option<BTreeMap<String, String>>,
    pub wmts: Wmts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Wmts {
    pub restful_template: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layer {
    pub name: String,
    pub title: String,
    pub tile_sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cache {
    pub cache: CacheBackend,
    pub disable_storage: bool,
    pub sources: Vec<String>,
    pub grids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheBackend {
    #[serde(rename = "type")]
    pub kind: String,
    pub use_grid_names: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub kind: String,
    pub seed_only: bool,
    pub req: BTreeMap<String, toml::Value>,
    pub coverage: Coverage,
    pub wms_opts: WmsOpts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WmsOpts {
    pub featureinfo: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grid {
    pub srs: String,
    pub origin: String,
    pub res: Vec<f64>,
    pub bbox: BBox,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Globals {
    pub cache: GlobalCache,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalCache {
    pub base_dir: PathBuf,
}

// ── Naming ─────────────────────────────────────────────────────────

pub fn source_name(cluster_id: &str) -> String {
    format!("{cluster_id}_source")
}

pub fn cache_name(cluster_id: &str) -> String {
    format!("{cluster_id}_cache")
}

/// Grid a cluster's cache is bound to.
pub fn grid_name(config: &CatalogConfig, cluster_id: &str) -> String {
    match config.grid.mode {
        GridMode::Shared => config.grid.name.clone(),
        GridMode::PerCluster => format!("{cluster_id}_grid"),
    }
}

// ── Synthesizer ────────────────────────────────────────────────────

pub struct ConfigSynthesizer<'c> {
    catalog_id: &'c str,
    config: &'c CatalogConfig,
}

impl<'c> ConfigSynthesizer<'c> {
    /// Validates the catalog config before anything else happens.
    pub fn new(catalog_id: &'c str, config: &'c CatalogConfig) -> SeedResult<Self> {
        config.validate()?;
        Ok(Self { catalog_id, config })
    }

    /// `<topology_dir>/<catalog>.yaml`
    pub fn topology_path(&self) -> PathBuf {
        self.config
            .paths
            .topology_dir
            .join(format!("{}.yaml", self.catalog_id))
    }

    /// `<topology_dir>/<catalog>_geoms/<cluster>.wkt`
    pub fn footprint_path(&self, cluster_id: &str) -> PathBuf {
        self.config
            .paths
            .topology_dir
            .join(format!("{}_geoms", self.catalog_id))
            .join(format!("{cluster_id}.wkt"))
    }

    pub fn build(&self, clusters: &[TileCluster]) -> SeedResult<Topology> {
        let mut ordered: Vec<&TileCluster> = clusters.iter().collect();
        ordered.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

        let grid = &self.config.grid;
        let mut topology = Topology {
            services: Services {
                demo: None,
                wmts: Wmts {
                    restful_template: WMTS_RESTFUL_TEMPLATE.to_string(),
                },
            },
            layers: Vec::with_capacity(ordered.len()),
            caches: BTreeMap::new(),
            sources: BTreeMap::new(),
            grids: BTreeMap::new(),
            globals: Globals {
                cache: GlobalCache {
                    base_dir: self.config.paths.cache_base_dir.join(self.catalog_id),
                },
            },
        };

        if grid.mode == GridMode::Shared {
            let extent = grid.bbox.or_else(|| {
                ordered
                    .iter()
                    .map(|c| c.bbox.padded(grid.padding))
                    .reduce(|a, b| a.union(&b))
            });
            if let Some(bbox) = extent {
                topology.grids.insert(grid.name.clone(), self.grid(bbox));
            }
        }

        for cluster in ordered {
            let id = cluster.id.as_str();
            let grid_name = grid_name(self.config, id);
            if grid.mode == GridMode::PerCluster {
                topology
                    .grids
                    .insert(grid_name.clone(), self.grid(cluster.bbox.padded(grid.padding)));
            }

            topology.sources.insert(source_name(id), self.source(cluster)?);
            topology.caches.insert(
                cache_name(id),
                Cache {
                    cache: CacheBackend {
                        kind: "file".to_string(),
                        use_grid_names: true,
                    },
                    disable_storage: false,
                    sources: vec![source_name(id)],
                    grids: vec![grid_name],
                },
            );
            topology.layers.push(Layer {
                name: id.to_string(),
                title: id.to_string(),
                tile_sources: vec![cache_name(id)],
            });
        }

        debug!(
            catalog = %self.catalog_id,
            layers = topology.layers.len(),
            grids = topology.grids.len(),
            "topology built"
        );
        Ok(topology)
    }

    fn grid(&self, bbox: BBox) -> Grid {
        Grid {
            srs: self.config.grid.srs.clone(),
            origin: self.config.grid.origin.clone(),
            res: self.config.grid.res.clone(),
            bbox,
        }
    }

    fn source(&self, cluster: &TileCluster) -> SeedResult<Source> {
        // Sentinel clusters replace the inventory source outright.
        let upstream = if cluster.uses_secondary_partition(self.config) {
            self.config.sources.additional.as_ref().ok_or_else(|| {
                SeedError::ConfigValidation(tilesync_core::ConfigError::InconsistentOverrideConfig)
            })?
        } else {
            &self.config.sources.inventory
        };
        let mut req = BTreeMap::new();
        req.insert("transparent".to_string(), toml::Value::Boolean(true));
        req.extend(upstream.clone());
        Ok(Source {
            kind: "wms".to_string(),
            seed_only: true,
            req,
            coverage: Coverage {
                srs: self.config.seeding.crs.clone(),
                source: GeometrySource::Datasource(self.footprint_path(cluster.id.as_str())),
            },
            wms_opts: WmsOpts { featureinfo: true },
        })
    }

    /// Write footprint files, then the topology document. Returns the
    /// document path.
    pub fn write(&self, topology: &Topology, clusters: &[TileCluster]) -> SeedResult<PathBuf> {
        for cluster in clusters {
            write_atomic(
                &self.footprint_path(cluster.id.as_str()),
                cluster.footprint.as_bytes(),
            )?;
        }
        let path = self.topology_path();
        write_yaml(&path, topology)?;
        info!(catalog = %self.catalog_id, path = %path.display(), "topology written");
        Ok(path)
    }

    /// Build and write in one step.
    pub fn synthesize(&self, clusters: &[TileCluster]) -> SeedResult<PathBuf> {
        let topology = self.build(clusters)?;
        self.write(&topology, clusters)
    }
}
