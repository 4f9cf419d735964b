//! tilesync-seed — keeps rendered tile caches in step with the geodatabase.
//!
//! One run refreshes the tile-cluster partition, regenerates the topology
//! the rendering engine serves from, then seeds each cluster with the
//! smallest coverage that brings it up to date:
//!
//! - Full runs re-render every cluster over its padded extent
//! - Delta runs re-render only the boundary of features edited since the
//!   catalog's watermark, and skip clusters with no edits
//! - Feature runs re-render the boundary of an explicit node list
//!
//! # Architecture
//!
//! ```text
//! SeedJobDispatcher
//!   ├── TileClusterCatalog (refresh views, enumerate clusters)
//!   │     └── SelectorCoordinator (session scope via gw_fct_setselectors)
//!   ├── ConfigSynthesizer (topology YAML + footprint WKT files)
//!   ├── CoverageStrategy
//!   │     ├── Static (padded bbox, footprint, or fixed)
//!   │     └── Queried (gw_fct_getfeatureboundary since watermark)
//!   ├── TileRenderer (mapproxy-seed per cluster)
//!   └── ChangeTracker (watermarks + retiling log in tilesync-state)
//! ```
//!
//! All database access goes through the [`GeoStore`] gateway on a single
//! session; every step is awaited before the next.

pub mod catalog;
pub mod coverage;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod persist;
pub mod pg;
pub mod renderer;
pub mod seed_doc;
pub mod selector;
pub mod topology;
pub mod tracker;

#[cfg(test)]
mod test_support;

pub use catalog::{TileCluster, TileClusterCatalog};
pub use coverage::{Coverage, CoverageStrategy, GeometrySource, ResolvedCoverage};
pub use dispatcher::{ClusterFailure, RunReport, SeedJobDispatcher};
pub use error::{SeedError, SeedResult};
pub use gateway::GeoStore;
pub use pg::PgGeoStore;
pub use renderer::{MapProxySeed, RenderJob, TileRenderer};
pub use selector::SelectorCoordinator;
pub use topology::{ConfigSynthesizer, Topology};
pub use tracker::ChangeTracker;
