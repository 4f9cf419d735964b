//! Tile-cluster catalog — refresh and enumerate the partition.

use std::collections::BTreeSet;

use tilesync_core::{BBox, CatalogConfig, TileClusterId, ZoneKind};
use tracing::{debug, error, info};

use crate::error::{SeedError, SeedResult};
use crate::gateway::{GeoStore, PartitionSource, rollback_on_err};
use crate::selector::SelectorCoordinator;

/// One cluster of the partition.
#[derive(Debug, Clone, PartialEq)]
pub struct TileCluster {
    pub id: TileClusterId,
    /// Footprint as WKT.
    pub footprint: String,
    pub bbox: BBox,
}

impl TileCluster {
    /// Whether this cluster is served from the additional schema and source.
    pub fn uses_secondary_partition(&self, config: &CatalogConfig) -> bool {
        config.has_secondary_partition()
            && self.id.zone(ZoneKind::Network) == Some(config.seeding.network_sentinel.as_str())
    }
}

pub struct TileClusterCatalog<'c> {
    config: &'c CatalogConfig,
}

impl<'c> TileClusterCatalog<'c> {
    pub fn new(config: &'c CatalogConfig) -> Self {
        Self { config }
    }

    fn source(&self) -> PartitionSource<'c> {
        PartitionSource {
            table: &self.config.catalog.table,
            id_column: &self.config.catalog.id_column,
            geom_column: &self.config.catalog.geom_column,
        }
    }

    /// Current cluster ids, read in their own transaction.
    pub async fn cluster_ids<S: GeoStore>(&self, store: &mut S) -> SeedResult<BTreeSet<String>> {
        let ids = store.cluster_ids(self.source()).await;
        let ids = rollback_on_err(store, ids).await?;
        store.commit().await?;
        Ok(ids.into_iter().collect())
    }

    /// Rebuild the materialized views behind the partition.
    ///
    /// With `must_be_stable`, a change in the id set fails the refresh with
    /// `CatalogDrift`: incremental runs cannot reconcile a re-partition.
    pub async fn refresh<S: GeoStore>(&self, store: &mut S, must_be_stable: bool) -> SeedResult<()> {
        let before = self.cluster_ids(store).await?;

        SelectorCoordinator::new(self.config)?
            .apply_scope(store, &self.config.default_scope())
            .await?;

        let views = self
            .config
            .catalog
            .materialized_views
            .iter()
            .chain(self.config.catalog.partition_view.as_ref());
        for view in views {
            let refreshed = store.refresh_view(view).await;
            rollback_on_err(store, refreshed).await?;
            store.commit().await?;
            debug!(%view, "materialized view refreshed");
        }

        let after = self.cluster_ids(store).await?;
        if must_be_stable && before != after {
            let added: Vec<String> = after.difference(&before).cloned().collect();
            let removed: Vec<String> = before.difference(&after).cloned().collect();
            error!(?added, ?removed, "tile-cluster catalog drifted");
            return Err(SeedError::CatalogDrift { added, removed });
        }
        info!(clusters = after.len(), "tile-cluster catalog refreshed");
        Ok(())
    }

    /// Current clusters, ordered by id.
    pub async fn enumerate<S: GeoStore>(&self, store: &mut S) -> SeedResult<Vec<TileCluster>> {
        let rows = store.clusters(self.source()).await;
        let rows = rollback_on_err(store, rows).await?;
        store.commit().await?;

        let mut clusters = rows
            .into_iter()
            .map(|row| {
                Ok(TileCluster {
                    id: TileClusterId::parse(&row.id)?,
                    footprint: row.footprint,
                    bbox: row.bbox,
                })
            })
            .collect::<SeedResult<Vec<_>>>()?;
        clusters.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(clusters)
    }
}
