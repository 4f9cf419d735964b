//! Coverage resolution — the area of one cluster that needs re-rendering.
//!
//! Full runs use a static shape derived from the cluster (or one fixed
//! coverage for every cluster). Delta runs ask the database for the
//! boundary of features edited since the watermark, scoped to the cluster;
//! an empty boundary means the cluster is skipped.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tilesync_core::config::FullCoverageShape;
use tilesync_core::geometry::geojson_is_empty;
use tilesync_core::{BBox, CatalogConfig};
use tracing::debug;

use crate::catalog::TileCluster;
use crate::error::{SeedError, SeedResult};
use crate::gateway::{GeoStore, rollback_on_err};
use crate::persist::write_json;
use crate::selector::SelectorCoordinator;

/// `lastSeed` layout expected by the boundary procedure.
pub const LAST_SEED_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// A coverage as the rendering engine reads it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coverage {
    pub srs: String,
    #[serde(flatten)]
    pub source: GeometrySource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometrySource {
    Bbox(BBox),
    /// Path to a WKT or GeoJSON file.
    Datasource(PathBuf),
    Wkt(String),
}

/// A coverage together with the geometry recorded in the retiling log.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCoverage {
    pub coverage: Coverage,
    pub geometry: Value,
}

impl ResolvedCoverage {
    fn from_coverage(coverage: Coverage) -> SeedResult<Self> {
        let geometry =
            serde_json::to_value(&coverage).map_err(|e| SeedError::Serialize(e.to_string()))?;
        Ok(Self { coverage, geometry })
    }
}

#[derive(Debug, Clone)]
pub enum CoverageStrategy {
    Static(StaticCoverage),
    Queried(QueriedCoverage),
}

#[derive(Debug, Clone)]
pub enum StaticCoverage {
    /// Derived from each cluster's own extent.
    ClusterExtent {
        shape: FullCoverageShape,
        padding: f64,
    },
    /// The same coverage for every cluster.
    Fixed(Coverage),
}

/// Changes since `since`, written to `scratch_dir` when non-empty.
#[derive(Debug, Clone)]
pub struct QueriedCoverage {
    pub since: DateTime<Utc>,
    pub scratch_dir: PathBuf,
}

impl CoverageStrategy {
    /// Full-run strategy from catalog config.
    pub fn full(config: &CatalogConfig) -> Self {
        CoverageStrategy::Static(StaticCoverage::ClusterExtent {
            shape: config.seeding.full_coverage,
            padding: config.grid.padding,
        })
    }

    pub fn delta(config: &CatalogConfig, since: DateTime<Utc>) -> Self {
        CoverageStrategy::Queried(QueriedCoverage {
            since,
            scratch_dir: config.paths.scratch_dir.clone(),
        })
    }

    /// `None` means the cluster has nothing to re-render this run.
    pub async fn resolve<S: GeoStore>(
        &self,
        store: &mut S,
        config: &CatalogConfig,
        cluster: &TileCluster,
    ) -> SeedResult<Option<ResolvedCoverage>> {
        match self {
            CoverageStrategy::Static(StaticCoverage::ClusterExtent { shape, padding }) => {
                let source = match shape {
                    FullCoverageShape::PaddedBbox => {
                        GeometrySource::Bbox(cluster.bbox.padded(*padding))
                    }
                    FullCoverageShape::Footprint => GeometrySource::Wkt(cluster.footprint.clone()),
                };
                let coverage = Coverage {
                    srs: config.seeding.crs.clone(),
                    source,
                };
                ResolvedCoverage::from_coverage(coverage).map(Some)
            }
            CoverageStrategy::Static(StaticCoverage::Fixed(coverage)) => {
                ResolvedCoverage::from_coverage(coverage.clone()).map(Some)
            }
            CoverageStrategy::Queried(queried) => queried.resolve(store, config, cluster).await,
        }
    }
}

impl QueriedCoverage {
    async fn resolve<S: GeoStore>(
        &self,
        store: &mut S,
        config: &CatalogConfig,
        cluster: &TileCluster,
    ) -> SeedResult<Option<ResolvedCoverage>> {
        SelectorCoordinator::new(config)?
            .apply_default_scope(store, &cluster.id)
            .await?;

        let secondary = cluster.uses_secondary_partition(config);
        let (schema, tables) = match (secondary, &config.database.additional_schema) {
            (true, Some(additional)) => (additional, &config.seeding.additional_update_tables),
            _ => (&config.database.schema, &config.seeding.update_tables),
        };

        let envelope = time_boundary_envelope(tables, self.since, &cluster.id.zone_predicate());
        let boundary = store.feature_boundary(schema, &envelope).await;
        let boundary = rollback_on_err(store, boundary).await?;
        store.commit().await?;

        let Some(geometry) = boundary.filter(|g| !geojson_is_empty(g)) else {
            debug!(cluster = %cluster.id, %schema, "no changes since watermark");
            return Ok(None);
        };

        let path = self.scratch_dir.join(format!("{}.geojson", cluster.id));
        write_json(&path, &geometry)?;
        Ok(Some(ResolvedCoverage {
            coverage: Coverage {
                srs: config.seeding.crs.clone(),
                source: GeometrySource::Datasource(path),
            },
            geometry,
        }))
    }
}

fn boundary_client() -> Value {
    json!({"device": 4, "infoType": 1, "lang": "ES"})
}

/// Boundary request for features in `tables` edited after `since`,
/// restricted by `extra`.
pub fn time_boundary_envelope(tables: &[String], since: DateTime<Utc>, extra: &str) -> Value {
    json!({
        "client": boundary_client(),
        "form": {},
        "feature": {"update_tables": tables},
        "data": {
            "type": "time",
            "lastSeed": since.format(LAST_SEED_FORMAT).to_string(),
            "extra": extra,
        },
    })
}

/// Boundary request for an explicit set of nodes.
pub fn feature_boundary_envelope(node_ids: &[i64]) -> Value {
    json!({
        "client": boundary_client(),
        "form": {},
        "feature": {"node": node_ids},
        "data": {"type": "feature"},
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Call, FakeGeoStore, cluster, config_with_additional, test_config};
    use chrono::TimeZone;

    fn since() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn padded_bbox_grows_cluster_extent() {
        let config = test_config();
        let mut store = FakeGeoStore::new();
        let c = cluster("N1-M10", BBox::new(100.0, 200.0, 300.0, 400.0));

        let resolved = CoverageStrategy::full(&config)
            .resolve(&mut store, &config, &c)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            resolved.coverage.source,
            GeometrySource::Bbox(BBox::new(-49_900.0, -49_800.0, 50_300.0, 50_400.0))
        );
        assert_eq!(resolved.geometry["srs"], "EPSG:25831");
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn footprint_shape_uses_cluster_wkt() {
        let mut config = test_config();
        config.seeding.full_coverage = FullCoverageShape::Footprint;
        let mut store = FakeGeoStore::new();
        let c = cluster("N1-M10", BBox::new(0.0, 0.0, 10.0, 10.0));

        let resolved = CoverageStrategy::full(&config)
            .resolve(&mut store, &config, &c)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.coverage.source, GeometrySource::Wkt(c.footprint.clone()));
    }

    #[tokio::test]
    async fn empty_boundary_resolves_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.paths.scratch_dir = dir.path().to_path_buf();
        let mut store = FakeGeoStore::new();
        store.boundary_for("N1-M10", json!({"type": "FeatureCollection", "features": []}));

        let c = cluster("N1-M10", BBox::new(0.0, 0.0, 10.0, 10.0));
        let resolved = CoverageStrategy::delta(&config, since())
            .resolve(&mut store, &config, &c)
            .await
            .unwrap();
        assert!(resolved.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn changed_features_are_written_to_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.paths.scratch_dir = dir.path().to_path_buf();
        let mut store = FakeGeoStore::new();
        let changed = json!({"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]});
        store.boundary_for("N1-M10", changed.clone());

        let c = cluster("N1-M10", BBox::new(0.0, 0.0, 10.0, 10.0));
        let resolved = CoverageStrategy::delta(&config, since())
            .resolve(&mut store, &config, &c)
            .await
            .unwrap()
            .unwrap();

        let path = dir.path().join("N1-M10.geojson");
        assert_eq!(resolved.coverage.source, GeometrySource::Datasource(path.clone()));
        assert_eq!(resolved.geometry, changed);
        let on_disk: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk, changed);

        let (schema, envelope) = store.boundary_calls().pop().unwrap();
        assert_eq!(schema, "ws");
        assert_eq!(envelope["data"]["type"], "time");
        assert_eq!(envelope["data"]["lastSeed"], "2025-03-01 08:30:00.000000");
        assert_eq!(envelope["data"]["extra"], "network_id = '1' AND muni_id = '10'");
        assert_eq!(envelope["feature"]["update_tables"], json!(["node", "arc"]));
    }

    #[tokio::test]
    async fn sentinel_network_queries_additional_schema() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_with_additional();
        config.paths.scratch_dir = dir.path().to_path_buf();
        let mut store = FakeGeoStore::new();

        let c = cluster("N2-M10", BBox::new(0.0, 0.0, 10.0, 10.0));
        CoverageStrategy::delta(&config, since())
            .resolve(&mut store, &config, &c)
            .await
            .unwrap();

        let (schema, envelope) = store.boundary_calls().pop().unwrap();
        assert_eq!(schema, "ud");
        assert_eq!(envelope["feature"]["update_tables"], json!(["gully"]));
    }

    #[tokio::test]
    async fn delta_scopes_session_before_querying() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.paths.scratch_dir = dir.path().to_path_buf();
        let mut store = FakeGeoStore::new();

        let c = cluster("N1-M10", BBox::new(0.0, 0.0, 10.0, 10.0));
        CoverageStrategy::delta(&config, since())
            .resolve(&mut store, &config, &c)
            .await
            .unwrap();

        let calls = store.calls();
        let boundary_at = calls
            .iter()
            .position(|c| matches!(c, Call::FeatureBoundary { .. }))
            .unwrap();
        let sets = calls[..boundary_at]
            .iter()
            .filter(|c| matches!(c, Call::SetSelector { .. }))
            .count();
        assert_eq!(sets, 2);
    }

    #[test]
    fn coverage_serializes_as_engine_keys() {
        let bbox = Coverage {
            srs: "EPSG:25831".to_string(),
            source: GeometrySource::Bbox(BBox::new(1.0, 2.0, 3.0, 4.0)),
        };
        assert_eq!(
            serde_json::to_value(&bbox).unwrap(),
            json!({"srs": "EPSG:25831", "bbox": [1.0, 2.0, 3.0, 4.0]})
        );

        let file = Coverage {
            srs: "EPSG:25831".to_string(),
            source: GeometrySource::Datasource(PathBuf::from("/tmp/x.geojson")),
        };
        assert_eq!(
            serde_json::to_value(&file).unwrap(),
            json!({"srs": "EPSG:25831", "datasource": "/tmp/x.geojson"})
        );
    }

    #[test]
    fn feature_envelope_lists_nodes() {
        let envelope = feature_boundary_envelope(&[1001, 1002]);
        assert_eq!(envelope["feature"]["node"], json!([1001, 1002]));
        assert!(envelope["feature"]["node"][0].is_i64());
        assert_eq!(envelope["data"], json!({"type": "feature"}));
        assert_eq!(envelope["client"]["device"], 4);
    }
}
