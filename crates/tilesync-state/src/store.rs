//! StateStore — redb-backed persistence for seeding state.
//!
//! Holds catalog watermarks and the retiling log. Values are JSON in
//! redb's `&[u8]` columns. On-disk and in-memory backends are supported,
//! the latter for tests.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, DatabaseError, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Map any redb error into `StateError::Storage`.
macro_rules! storage {
    () => {
        |e| StateError::Storage(e.to_string())
    };
}

#[derive(Clone, Debug)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a store file. Fails with `Locked` when another
    /// process already has it open.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(|e| match e {
            DatabaseError::DatabaseAlreadyOpen => StateError::Locked(path.to_path_buf()),
            other => StateError::Open(other.to_string()),
        })?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Ephemeral in-memory store.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(|e| StateError::Open(e.to_string()))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(storage!())?;
        txn.open_table(WATERMARKS).map_err(storage!())?;
        txn.open_table(RETILING_LOG).map_err(storage!())?;
        txn.commit().map_err(storage!())?;
        Ok(())
    }

    // ── Watermarks ─────────────────────────────────────────────────

    /// Upsert the watermark for a catalog.
    pub fn put_watermark(&self, catalog_id: &str, last_seed: DateTime<Utc>) -> StateResult<()> {
        let mark = Watermark {
            catalog_id: catalog_id.to_string(),
            last_seed,
        };
        let value = serde_json::to_vec(&mark).map_err(|source| StateError::Encode {
            what: "watermark",
            source,
        })?;
        let txn = self.db.begin_write().map_err(storage!())?;
        {
            let mut table = txn.open_table(WATERMARKS).map_err(storage!())?;
            table
                .insert(catalog_id, value.as_slice())
                .map_err(storage!())?;
        }
        txn.commit().map_err(storage!())?;
        debug!(%catalog_id, %last_seed, "watermark stored");
        Ok(())
    }

    pub fn get_watermark(&self, catalog_id: &str) -> StateResult<Option<Watermark>> {
        let txn = self.db.begin_read().map_err(storage!())?;
        let table = txn.open_table(WATERMARKS).map_err(storage!())?;
        match table.get(catalog_id).map_err(storage!())? {
            Some(guard) => decode(guard.value(), "watermark").map(Some),
            None => Ok(None),
        }
    }

    // ── Retiling log ───────────────────────────────────────────────

    /// Append a new entry. Keys are never reused.
    pub fn append_log(&self, entry: &RetilingLogEntry) -> StateResult<String> {
        let key = entry.table_key();
        let value = serde_json::to_vec(entry).map_err(|source| StateError::Encode {
            what: "retiling log entry",
            source,
        })?;
        let txn = self.db.begin_write().map_err(storage!())?;
        {
            let mut table = txn.open_table(RETILING_LOG).map_err(storage!())?;
            if table.get(key.as_str()).map_err(storage!())?.is_some() {
                return Err(StateError::DuplicateLogEntry(key));
            }
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(storage!())?;
        }
        txn.commit().map_err(storage!())?;
        debug!(%key, "retiling log entry opened");
        Ok(key)
    }

    /// Patch an open entry with its end time and outcome.
    pub fn finish_log(
        &self,
        key: &str,
        finished_at: DateTime<Utc>,
        outcome: JobOutcome,
    ) -> StateResult<RetilingLogEntry> {
        let txn = self.db.begin_write().map_err(storage!())?;
        let entry = {
            let mut table = txn.open_table(RETILING_LOG).map_err(storage!())?;
            let mut entry: RetilingLogEntry = match table.get(key).map_err(storage!())? {
                Some(guard) => decode(guard.value(), "retiling log entry")?,
                None => return Err(StateError::LogEntryNotFound(key.to_string())),
            };
            entry.finished_at = Some(finished_at);
            entry.outcome = Some(outcome);
            let value = serde_json::to_vec(&entry).map_err(|source| StateError::Encode {
                what: "retiling log entry",
                source,
            })?;
            table.insert(key, value.as_slice()).map_err(storage!())?;
            entry
        };
        txn.commit().map_err(storage!())?;
        debug!(%key, "retiling log entry closed");
        Ok(entry)
    }

    /// Newest entry per cluster for a catalog, considering only `modes`.
    pub fn latest_log_per_cluster(
        &self,
        catalog_id: &str,
        modes: &[RunMode],
    ) -> StateResult<BTreeMap<String, RetilingLogEntry>> {
        let mut latest: BTreeMap<String, RetilingLogEntry> = BTreeMap::new();
        for entry in self.all_log()? {
            if entry.catalog_id != catalog_id || !modes.contains(&entry.mode) {
                continue;
            }
            match latest.get(&entry.tilecluster_id) {
                Some(seen) if seen.started_at >= entry.started_at => {}
                _ => {
                    latest.insert(entry.tilecluster_id.clone(), entry);
                }
            }
        }
        Ok(latest)
    }

    /// Most recent entries for a catalog, newest first.
    pub fn recent_log(&self, catalog_id: &str, limit: usize) -> StateResult<Vec<RetilingLogEntry>> {
        let mut entries: Vec<RetilingLogEntry> = self
            .all_log()?
            .into_iter()
            .filter(|e| e.catalog_id == catalog_id)
            .collect();
        entries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        entries.truncate(limit);
        Ok(entries)
    }

    /// Entries that were opened but never closed.
    pub fn open_log(&self, catalog_id: &str) -> StateResult<Vec<RetilingLogEntry>> {
        Ok(self
            .all_log()?
            .into_iter()
            .filter(|e| e.catalog_id == catalog_id && e.is_open())
            .collect())
    }

    fn all_log(&self) -> StateResult<Vec<RetilingLogEntry>> {
        let txn = self.db.begin_read().map_err(storage!())?;
        let table = txn.open_table(RETILING_LOG).map_err(storage!())?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(storage!())? {
            let (_, value) = entry.map_err(storage!())?;
            results.push(decode(value.value(), "retiling log entry")?);
        }
        Ok(results)
    }
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8], what: &'static str) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(|source| StateError::Decode { what, source })
}
