//! tilesync-core — shared types for the tile-cache seeder.
//!
//! - **`config`** — per-catalog TOML configuration and its validation
//! - **`zone`** — map-zone registry and tile-cluster id parsing
//! - **`scope`** — selector scope requests
//! - **`geometry`** — bounding boxes and GeoJSON emptiness checks

pub mod config;
pub mod geometry;
pub mod scope;
pub mod zone;

pub use config::{CatalogConfig, ConfigError, ConfigResult};
pub use geometry::BBox;
pub use scope::{ScopeEntry, ScopeValue};
pub use zone::{MapZone, TileClusterId, ZoneError, ZoneKind};
