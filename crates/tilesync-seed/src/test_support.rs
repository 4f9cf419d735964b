//! In-memory gateway and renderer fakes shared by the unit tests.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Value, json};
use tilesync_core::{BBox, CatalogConfig, MapZone, TileClusterId};

use crate::catalog::TileCluster;
use crate::error::SeedError;
use crate::gateway::{ClusterRow, GeoStore, PartitionSource, StoreFuture};
use crate::renderer::{RenderFuture, RenderJob, TileRenderer};

// ── Configs ────────────────────────────────────────────────────────

pub fn test_config() -> CatalogConfig {
    CatalogConfig::from_toml_str(
        r#"
[database]
url = "postgres://mapproxy@localhost/giswater"
schema = "ws"

[catalog]
table = "tiled.tileclusters"
partition_view = "tiled.tileclusters"

[sources.inventory]
url = "http://qgis/ows"
layers = "inventory"

[seeding]
update_tables = ["node", "arc"]
"#,
    )
    .unwrap()
}

pub fn config_with_additional() -> CatalogConfig {
    CatalogConfig::from_toml_str(
        r#"
[database]
url = "postgres://mapproxy@localhost/giswater"
schema = "ws"
additional_schema = "ud"

[catalog]
table = "tiled.tileclusters"
materialized_views = ["tiled.ws_t_node", "tiled.ws_t_arc"]
partition_view = "tiled.tileclusters"

[[catalog.default_scope]]
zone = "exploitation"

[[catalog.default_scope]]
zone = "state"
ids = ["1"]

[grid]
mode = "per_cluster"
padding = 1000.0

[sources.inventory]
url = "http://qgis/ows"
layers = "inventory"

[sources.additional]
url = "http://qgis-ud/ows"
layers = "inventory_ud"

[seeding]
update_tables = ["node", "arc"]
additional_update_tables = ["gully"]
"#,
    )
    .unwrap()
}

pub fn cluster(id: &str, bbox: BBox) -> TileCluster {
    TileCluster {
        id: TileClusterId::parse(id).unwrap(),
        footprint: outline(&bbox),
        bbox,
    }
}

/// WKT polygon tracing a bbox, standing in for `ST_AsText`.
pub fn outline(b: &BBox) -> String {
    format!(
        "POLYGON(({x0} {y0},{x1} {y0},{x1} {y1},{x0} {y1},{x0} {y0}))",
        x0 = b.min_x,
        y0 = b.min_y,
        x1 = b.max_x,
        y1 = b.max_y,
    )
}

// ── Gateway ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ClearSelectors { schema: String, table: String },
    SetSelector { schema: String, envelope: Value },
    RefreshView(String),
    ClusterIds,
    Clusters,
    FeatureBoundary { schema: String, envelope: Value },
    Commit,
    Rollback,
}

#[derive(Default)]
struct GeoState {
    calls: Vec<Call>,
    ids: Vec<String>,
    ids_after_refresh: Option<Vec<String>>,
    /// tab name → selected ids; `*` marks select-all.
    selection: BTreeMap<String, BTreeSet<String>>,
    rejects: HashSet<(String, String)>,
    boundaries: BTreeMap<String, Value>,
    feature_boundary: Option<Value>,
}

/// Records every call; clones share state.
#[derive(Clone, Default)]
pub struct FakeGeoStore {
    state: Arc<Mutex<GeoState>>,
}

impl FakeGeoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clusters(ids: &[&str]) -> Self {
        let store = Self::new();
        store.lock().ids = ids.iter().map(|s| s.to_string()).collect();
        store
    }

    fn lock(&self) -> MutexGuard<'_, GeoState> {
        self.state.lock().unwrap()
    }

    /// Partition ids once any view has been refreshed.
    pub fn clusters_after_refresh(&self, ids: &[&str]) {
        self.lock().ids_after_refresh = Some(ids.iter().map(|s| s.to_string()).collect());
    }

    pub fn reject_selector(&self, tab: &str, id: &str) {
        self.lock().rejects.insert((tab.to_string(), id.to_string()));
    }

    /// Time-boundary reply while the session is scoped to exactly `cluster`.
    pub fn boundary_for(&self, cluster: &str, geometry: Value) {
        self.lock().boundaries.insert(cluster.to_string(), geometry);
    }

    /// Forget every time-boundary reply, as if no edits are newer than
    /// the watermark.
    pub fn clear_boundaries(&self) {
        self.lock().boundaries.clear();
    }

    pub fn feature_boundary_result(&self, geometry: Value) {
        self.lock().feature_boundary = Some(geometry);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn set_selector_calls(&self) -> Vec<Value> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::SetSelector { envelope, .. } => Some(envelope.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn boundary_calls(&self) -> Vec<(String, Value)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::FeatureBoundary { schema, envelope } => {
                    Some((schema.clone(), envelope.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Current selection as sorted (tab, id) pairs.
    pub fn selection(&self) -> Vec<(String, String)> {
        self.lock()
            .selection
            .iter()
            .flat_map(|(tab, ids)| ids.iter().map(move |id| (tab.clone(), id.clone())))
            .collect()
    }

    fn bbox_for(index: usize) -> BBox {
        let x = index as f64 * 1000.0;
        BBox::new(x, 0.0, x + 500.0, 500.0)
    }
}

impl GeoState {
    fn scoped_to(&self, cluster: &str) -> bool {
        let Ok(id) = TileClusterId::parse(cluster) else {
            return false;
        };
        id.zones().len() == self.selection.len()
            && id.zones().iter().all(|(kind, zone_id)| {
                self.selection
                    .get(kind.zone().tab_name)
                    .is_some_and(|ids| ids.len() == 1 && ids.contains(zone_id))
            })
    }
}

impl GeoStore for FakeGeoStore {
    fn clear_selectors<'a>(&'a mut self, schema: &'a str, table: &'a str) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(Call::ClearSelectors {
                schema: schema.to_string(),
                table: table.to_string(),
            });
            let tab = MapZone::registry()
                .iter()
                .find(|z| z.selector_table == table)
                .map(|z| z.tab_name);
            let removed = tab
                .and_then(|tab| state.selection.remove(tab))
                .map_or(0, |ids| ids.len() as u64);
            Ok(removed)
        })
    }

    fn set_selector<'a>(
        &'a mut self,
        schema: &'a str,
        envelope: &'a Value,
    ) -> StoreFuture<'a, Value> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(Call::SetSelector {
                schema: schema.to_string(),
                envelope: envelope.clone(),
            });
            let data = &envelope["data"];
            let tab = data["tabName"].as_str().unwrap_or_default().to_string();
            let id = data["id"].as_str().unwrap_or("*").to_string();
            if state.rejects.contains(&(tab.clone(), id.clone())) {
                return Ok(json!({"status": "Failed"}));
            }
            state.selection.entry(tab).or_default().insert(id);
            Ok(json!({"status": "Accepted"}))
        })
    }

    fn refresh_view<'a>(&'a mut self, view: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(Call::RefreshView(view.to_string()));
            if let Some(ids) = state.ids_after_refresh.take() {
                state.ids = ids;
            }
            Ok(())
        })
    }

    fn cluster_ids<'a>(&'a mut self, _source: PartitionSource<'a>) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(Call::ClusterIds);
            Ok(state.ids.clone())
        })
    }

    fn clusters<'a>(&'a mut self, _source: PartitionSource<'a>) -> StoreFuture<'a, Vec<ClusterRow>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(Call::Clusters);
            Ok(state
                .ids
                .iter()
                .enumerate()
                .map(|(i, id)| {
                    let bbox = FakeGeoStore::bbox_for(i);
                    ClusterRow {
                        id: id.clone(),
                        footprint: outline(&bbox),
                        bbox,
                    }
                })
                .collect())
        })
    }

    fn feature_boundary<'a>(
        &'a mut self,
        schema: &'a str,
        envelope: &'a Value,
    ) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(Call::FeatureBoundary {
                schema: schema.to_string(),
                envelope: envelope.clone(),
            });
            if envelope["data"]["type"] == "feature" {
                return Ok(state.feature_boundary.clone());
            }
            let hit = state
                .boundaries
                .iter()
                .find(|(cluster, _)| state.scoped_to(cluster))
                .map(|(_, geometry)| geometry.clone());
            Ok(hit)
        })
    }

    fn commit(&mut self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.lock().calls.push(Call::Commit);
            Ok(())
        })
    }

    fn rollback(&mut self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.lock().calls.push(Call::Rollback);
            Ok(())
        })
    }
}

// ── Renderer ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RenderedJob {
    pub cluster: String,
    /// Seed document contents at invocation time.
    pub seed_doc: String,
    /// Store selection at invocation time, when observing a store.
    pub selection_at_invoke: Vec<(String, String)>,
}

/// Records every invocation; clones share state.
#[derive(Clone, Default)]
pub struct RecordingRenderer {
    jobs: Arc<Mutex<Vec<RenderedJob>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    observed: Option<FakeGeoStore>,
}

impl RecordingRenderer {
    /// Also capture `store`'s selection on each invocation.
    pub fn observing(store: &FakeGeoStore) -> Self {
        Self {
            observed: Some(store.clone()),
            ..Self::default()
        }
    }

    pub fn fail_for(&self, cluster: &str) {
        self.failing.lock().unwrap().insert(cluster.to_string());
    }

    pub fn jobs(&self) -> Vec<RenderedJob> {
        self.jobs.lock().unwrap().clone()
    }
}

impl TileRenderer for RecordingRenderer {
    fn invoke<'a>(&'a self, job: RenderJob<'a>) -> RenderFuture<'a> {
        Box::pin(async move {
            let seed_doc = std::fs::read_to_string(job.seed).unwrap_or_default();
            let selection_at_invoke = self
                .observed
                .as_ref()
                .map(FakeGeoStore::selection)
                .unwrap_or_default();
            self.jobs.lock().unwrap().push(RenderedJob {
                cluster: job.cluster.to_string(),
                seed_doc,
                selection_at_invoke,
            });
            if self.failing.lock().unwrap().contains(job.cluster) {
                return Err(SeedError::EngineInvocationFailed {
                    cluster: job.cluster.to_string(),
                    reason: "exited with code 1".to_string(),
                });
            }
            Ok(())
        })
    }
}
