//! tilesync-state — persistent seeding state.
//!
//! Backed by [redb](https://docs.rs/redb), stores the per-catalog seed
//! watermark and the retiling log written around every rendering job.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Log keys are `{process_id}:{tilecluster_id}:{started_at_ms}` so a job
//! can be patched on completion without a secondary index.
//!
//! The CLI opens one store file per catalog. redb refuses a second
//! concurrent open of the same file, which makes the store double as the
//! single-flight lease for runs against that catalog.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
