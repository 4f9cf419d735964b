//! Seed job dispatcher — one seeding run, start to finish.
//!
//! A run refreshes the catalog, regenerates the topology, then walks the
//! clusters in id order: scope the session, resolve a coverage, write the
//! seed document, invoke the engine and log the job. Engine failures are
//! recorded and the loop moves on; anything else aborts the run after
//! rolling back the open transaction.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tilesync_core::CatalogConfig;
use tilesync_core::config::WatermarkPolicy;
use tilesync_core::geometry::geojson_is_empty;
use tilesync_state::{JobOutcome, RunMode};
use tracing::{error, info, warn};

use crate::catalog::{TileCluster, TileClusterCatalog};
use crate::coverage::{
    Coverage, CoverageStrategy, GeometrySource, StaticCoverage, feature_boundary_envelope,
};
use crate::error::SeedResult;
use crate::gateway::{GeoStore, rollback_on_err};
use crate::persist::write_json;
use crate::renderer::{RenderJob, TileRenderer};
use crate::seed_doc::SeedDocument;
use crate::selector::SelectorCoordinator;
use crate::topology::{ConfigSynthesizer, cache_name, grid_name};
use crate::tracker::ChangeTracker;

// ── Report ─────────────────────────────────────────────────────────

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub catalog: String,
    pub mode: RunMode,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    /// Clusters the engine rendered successfully.
    pub seeded: Vec<String>,
    /// Clusters with nothing to render.
    pub skipped: Vec<String>,
    pub failed: Vec<ClusterFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterFailure {
    pub cluster: String,
    pub reason: String,
}

impl RunReport {
    fn new(catalog: &str, mode: RunMode, started: DateTime<Utc>) -> Self {
        Self {
            catalog: catalog.to_string(),
            mode,
            started,
            finished: started,
            seeded: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

// ── Dispatcher ─────────────────────────────────────────────────────

pub struct SeedJobDispatcher<'c, S, R> {
    catalog_id: &'c str,
    config: &'c CatalogConfig,
    store: S,
    renderer: R,
    tracker: ChangeTracker,
}

impl<'c, S: GeoStore, R: TileRenderer> SeedJobDispatcher<'c, S, R> {
    /// Fails on invalid config before any database call.
    pub fn new(
        catalog_id: &'c str,
        config: &'c CatalogConfig,
        store: S,
        renderer: R,
        tracker: ChangeTracker,
    ) -> SeedResult<Self> {
        config.validate()?;
        Ok(Self {
            catalog_id,
            config,
            store,
            renderer,
            tracker,
        })
    }

    /// Re-seed every cluster over its full extent.
    pub async fn run_full(&mut self) -> SeedResult<RunReport> {
        let result = self.full().await;
        self.abort_on_err(result).await
    }

    /// Re-seed only what changed since the watermark, plus every cluster
    /// whose last full or delta job failed or never finished.
    pub async fn run_delta(&mut self) -> SeedResult<RunReport> {
        let result = self.delta().await;
        self.abort_on_err(result).await
    }

    /// Re-seed the boundary of explicitly edited nodes. Leaves the
    /// watermark alone.
    pub async fn run_feature(&mut self, node_ids: &[i64]) -> SeedResult<RunReport> {
        let result = self.feature(node_ids).await;
        self.abort_on_err(result).await
    }

    /// Regenerate the topology from the current partition without
    /// refreshing or seeding.
    pub async fn generate_topology(&mut self) -> SeedResult<PathBuf> {
        let result = self.topology().await;
        self.abort_on_err(result).await
    }

    async fn abort_on_err<T>(&mut self, result: SeedResult<T>) -> SeedResult<T> {
        if let Err(e) = &result {
            error!(catalog = %self.catalog_id, error = %e, "run aborted");
        }
        rollback_on_err(&mut self.store, result).await
    }

    async fn full(&mut self) -> SeedResult<RunReport> {
        let started = Utc::now();
        info!(catalog = %self.catalog_id, pid = self.tracker.process_id(), "full run started");

        let (clusters, topology) = self.prepare(false).await?;
        let policy = self.config.seeding.watermark_policy;
        if policy == WatermarkPolicy::AtStart {
            self.tracker.advance_watermark(self.catalog_id, started)?;
        }

        let strategy = CoverageStrategy::full(self.config);
        let mut report = RunReport::new(self.catalog_id, RunMode::Full, started);
        self.seed_clusters(&mut report, &clusters, &topology, &strategy, &BTreeSet::new())
            .await?;

        if policy == WatermarkPolicy::AfterRun {
            self.tracker.advance_watermark(self.catalog_id, started)?;
        }
        Ok(self.close(report))
    }

    async fn delta(&mut self) -> SeedResult<RunReport> {
        let since = self.tracker.require_watermark(self.catalog_id)?;
        let started = Utc::now();
        let retry = self.tracker.clusters_to_retry(self.catalog_id)?;
        info!(
            catalog = %self.catalog_id,
            pid = self.tracker.process_id(),
            %since,
            retry = retry.len(),
            "delta run started"
        );

        let (clusters, topology) = self.prepare(true).await?;
        let strategy = CoverageStrategy::delta(self.config, since);
        let mut report = RunReport::new(self.catalog_id, RunMode::Delta, started);
        self.seed_clusters(&mut report, &clusters, &topology, &strategy, &retry)
            .await?;

        self.tracker.advance_watermark(self.catalog_id, started)?;
        Ok(self.close(report))
    }

    async fn feature(&mut self, node_ids: &[i64]) -> SeedResult<RunReport> {
        let started = Utc::now();
        info!(
            catalog = %self.catalog_id,
            pid = self.tracker.process_id(),
            nodes = node_ids.len(),
            "feature run started"
        );

        let (clusters, topology) = self.prepare(false).await?;
        let mut report = RunReport::new(self.catalog_id, RunMode::Feature, started);

        SelectorCoordinator::new(self.config)?
            .apply_scope(&mut self.store, &self.config.default_scope())
            .await?;
        let envelope = feature_boundary_envelope(node_ids);
        let boundary = self
            .store
            .feature_boundary(&self.config.database.schema, &envelope)
            .await;
        let boundary = rollback_on_err(&mut self.store, boundary).await?;
        self.store.commit().await?;

        let Some(geometry) = boundary.filter(|g| !geojson_is_empty(g)) else {
            info!(catalog = %self.catalog_id, "feature boundary is empty, nothing to seed");
            report.skipped = clusters.iter().map(|c| c.id.to_string()).collect();
            return Ok(self.close(report));
        };

        let path = self
            .config
            .paths
            .scratch_dir
            .join(format!("{}_feature.geojson", self.catalog_id));
        write_json(&path, &geometry)?;
        let strategy = CoverageStrategy::Static(StaticCoverage::Fixed(Coverage {
            srs: self.config.seeding.crs.clone(),
            source: GeometrySource::Datasource(path),
        }));
        self.seed_clusters(&mut report, &clusters, &topology, &strategy, &BTreeSet::new())
            .await?;
        Ok(self.close(report))
    }

    async fn topology(&mut self) -> SeedResult<PathBuf> {
        let synthesizer = ConfigSynthesizer::new(self.catalog_id, self.config)?;
        let clusters = TileClusterCatalog::new(self.config)
            .enumerate(&mut self.store)
            .await?;
        synthesizer.synthesize(&clusters)
    }

    /// Refresh, enumerate and regenerate the topology.
    async fn prepare(&mut self, must_be_stable: bool) -> SeedResult<(Vec<TileCluster>, PathBuf)> {
        let synthesizer = ConfigSynthesizer::new(self.catalog_id, self.config)?;
        let catalog = TileClusterCatalog::new(self.config);
        catalog.refresh(&mut self.store, must_be_stable).await?;
        let clusters = catalog.enumerate(&mut self.store).await?;
        let topology = synthesizer.synthesize(&clusters)?;
        Ok((clusters, topology))
    }

    /// Seed `clusters` in order. Clusters named in `retry` get full
    /// coverage whatever `strategy` would resolve for them.
    async fn seed_clusters(
        &mut self,
        report: &mut RunReport,
        clusters: &[TileCluster],
        topology: &Path,
        strategy: &CoverageStrategy,
        retry: &BTreeSet<String>,
    ) -> SeedResult<()> {
        let selectors = SelectorCoordinator::new(self.config)?;
        let seed_path = SeedDocument::path_for(&self.config.paths.scratch_dir, self.catalog_id);
        let full = CoverageStrategy::full(self.config);

        for cluster in clusters {
            let id = cluster.id.as_str();
            let strategy = if retry.contains(id) {
                info!(cluster = %id, "retrying cluster that failed in an earlier run");
                &full
            } else {
                strategy
            };

            // Queried coverage scopes the session itself.
            if let CoverageStrategy::Static(_) = strategy {
                selectors
                    .apply_default_scope(&mut self.store, &cluster.id)
                    .await?;
            }

            let Some(resolved) = strategy
                .resolve(&mut self.store, self.config, cluster)
                .await?
            else {
                report.skipped.push(id.to_string());
                continue;
            };

            SeedDocument::new(
                cache_name(id),
                grid_name(self.config, id),
                Some(resolved.coverage),
                self.config.seeding.max_level,
            )
            .write(&seed_path)?;

            let key = self.tracker.open_job(
                self.catalog_id,
                id,
                report.mode,
                Utc::now(),
                resolved.geometry,
            )?;
            let job = RenderJob {
                cluster: id,
                topology,
                seed: &seed_path,
                concurrency: self.config.seeding.concurrency,
            };
            let outcome = match self.renderer.invoke(job).await {
                Ok(()) => {
                    report.seeded.push(id.to_string());
                    JobOutcome::Succeeded
                }
                Err(e) => {
                    warn!(cluster = %id, error = %e, "cluster failed to seed");
                    let reason = e.to_string();
                    report.failed.push(ClusterFailure {
                        cluster: id.to_string(),
                        reason: reason.clone(),
                    });
                    JobOutcome::Failed { reason }
                }
            };
            self.tracker.close_job(&key, Utc::now(), outcome)?;
        }
        Ok(())
    }

    fn close(&self, mut report: RunReport) -> RunReport {
        report.finished = Utc::now();
        info!(
            catalog = %self.catalog_id,
            mode = report.mode.as_str(),
            seeded = report.seeded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "run finished"
        );
        report
    }
}
