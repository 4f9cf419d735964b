//! Change tracker — watermarks and the retiling log for one process.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tilesync_state::{JobOutcome, RetilingLogEntry, RunMode, StateStore};
use tracing::{debug, info};

use crate::error::{SeedError, SeedResult};

#[derive(Clone)]
pub struct ChangeTracker {
    store: StateStore,
    process_id: u32,
}

impl ChangeTracker {
    /// Log entries are attributed to the current OS process.
    pub fn new(store: StateStore) -> Self {
        Self::with_process_id(store, std::process::id())
    }

    pub fn with_process_id(store: StateStore, process_id: u32) -> Self {
        Self { store, process_id }
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    pub fn watermark(&self, catalog_id: &str) -> SeedResult<Option<DateTime<Utc>>> {
        Ok(self
            .store
            .get_watermark(catalog_id)?
            .map(|mark| mark.last_seed))
    }

    /// The watermark, or `NoBaselineSeed` if the catalog was never seeded.
    pub fn require_watermark(&self, catalog_id: &str) -> SeedResult<DateTime<Utc>> {
        self.watermark(catalog_id)?
            .ok_or_else(|| SeedError::NoBaselineSeed(catalog_id.to_string()))
    }

    pub fn advance_watermark(&self, catalog_id: &str, at: DateTime<Utc>) -> SeedResult<()> {
        self.store.put_watermark(catalog_id, at)?;
        info!(%catalog_id, watermark = %at, "watermark advanced");
        Ok(())
    }

    /// Record a job start. Returns the key to close it with.
    pub fn open_job(
        &self,
        catalog_id: &str,
        cluster_id: &str,
        mode: RunMode,
        started_at: DateTime<Utc>,
        geometry: Value,
    ) -> SeedResult<String> {
        let entry = RetilingLogEntry::start(
            self.process_id,
            catalog_id,
            cluster_id,
            mode,
            started_at,
            geometry,
        );
        let key = self.store.append_log(&entry)?;
        debug!(%key, "job opened");
        Ok(key)
    }

    pub fn close_job(
        &self,
        key: &str,
        finished_at: DateTime<Utc>,
        outcome: JobOutcome,
    ) -> SeedResult<RetilingLogEntry> {
        Ok(self.store.finish_log(key, finished_at, outcome)?)
    }

    /// Newest entries first.
    pub fn recent_jobs(&self, catalog_id: &str, limit: usize) -> SeedResult<Vec<RetilingLogEntry>> {
        Ok(self.store.recent_log(catalog_id, limit)?)
    }

    /// Jobs that started but never finished.
    pub fn unfinished_jobs(&self, catalog_id: &str) -> SeedResult<Vec<RetilingLogEntry>> {
        Ok(self.store.open_log(catalog_id)?)
    }

    /// Clusters whose latest full or delta job failed or never finished.
    /// Their edits may predate the watermark, so delta runs re-seed them.
    pub fn clusters_to_retry(&self, catalog_id: &str) -> SeedResult<BTreeSet<String>> {
        let latest = self
            .store
            .latest_log_per_cluster(catalog_id, &[RunMode::Full, RunMode::Delta])?;
        Ok(latest
            .into_values()
            .filter(RetilingLogEntry::needs_retry)
            .map(|entry| entry.tilecluster_id)
            .collect())
    }
}
