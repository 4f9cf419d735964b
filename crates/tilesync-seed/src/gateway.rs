//! Database gateway used by the seeding components.
//!
//! Every call runs on the same database session, so selector rows written
//! by one call scope the queries of the next. Statements accumulate in an
//! open transaction until [`GeoStore::commit`] or [`GeoStore::rollback`].
//!
//! The production implementation is [`crate::pg::PgGeoStore`]; tests use
//! an in-memory recorder.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tilesync_core::BBox;

use crate::error::SeedResult;

/// Boxed future alias for gateway calls.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = SeedResult<T>> + Send + 'a>>;

/// Name of the stored procedure that sets selectors.
pub const SET_SELECTORS_FN: &str = "gw_fct_setselectors";

/// Name of the stored procedure that returns changed-feature boundaries.
pub const FEATURE_BOUNDARY_FN: &str = "gw_fct_getfeatureboundary";

/// One row of the tile-cluster partition.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterRow {
    pub id: String,
    /// Footprint as WKT.
    pub footprint: String,
    pub bbox: BBox,
}

/// Location of the partition rows.
#[derive(Debug, Clone, Copy)]
pub struct PartitionSource<'a> {
    pub table: &'a str,
    pub id_column: &'a str,
    pub geom_column: &'a str,
}

pub trait GeoStore: Send {
    /// Delete every selector row the session owns in `schema.table`.
    fn clear_selectors<'a>(&'a mut self, schema: &'a str, table: &'a str) -> StoreFuture<'a, u64>;

    /// Call `schema.gw_fct_setselectors(envelope)` and return its JSON reply.
    fn set_selector<'a>(&'a mut self, schema: &'a str, envelope: &'a Value)
    -> StoreFuture<'a, Value>;

    /// `REFRESH MATERIALIZED VIEW view`.
    fn refresh_view<'a>(&'a mut self, view: &'a str) -> StoreFuture<'a, ()>;

    /// Ids currently present in the partition.
    fn cluster_ids<'a>(&'a mut self, source: PartitionSource<'a>) -> StoreFuture<'a, Vec<String>>;

    /// Full partition rows.
    fn clusters<'a>(&'a mut self, source: PartitionSource<'a>) -> StoreFuture<'a, Vec<ClusterRow>>;

    /// Call `schema.gw_fct_getfeatureboundary(envelope)`; `None` when the
    /// procedure returns SQL NULL.
    fn feature_boundary<'a>(
        &'a mut self,
        schema: &'a str,
        envelope: &'a Value,
    ) -> StoreFuture<'a, Option<Value>>;

    fn commit(&mut self) -> StoreFuture<'_, ()>;

    fn rollback(&mut self) -> StoreFuture<'_, ()>;
}

/// Roll back the open transaction when `result` is an error, then hand the
/// result through unchanged.
pub async fn rollback_on_err<S: GeoStore, T>(store: &mut S, result: SeedResult<T>) -> SeedResult<T> {
    if let Err(e) = &result {
        if let Err(rb) = store.rollback().await {
            tracing::warn!(error = %rb, cause = %e, "rollback failed");
        }
    }
    result
}
