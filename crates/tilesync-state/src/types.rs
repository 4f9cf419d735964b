//! Persisted seeding records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Time up to which a catalog's tiles are known to be current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    pub catalog_id: String,
    pub last_seed: DateTime<Utc>,
}

/// How a seeding run chose its coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Full,
    Delta,
    Feature,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Full => "full",
            RunMode::Delta => "delta",
            RunMode::Feature => "feature",
        }
    }
}

/// Result of one rendering job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded,
    Failed { reason: String },
}

/// One rendering job for one tile cluster.
///
/// Written when the job starts and patched when the engine returns. An
/// entry without `finished_at` is still running or its process died.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetilingLogEntry {
    pub process_id: u32,
    pub catalog_id: String,
    pub tilecluster_id: String,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Coverage geometry handed to the engine (GeoJSON, bbox or path).
    pub geometry: Value,
    pub outcome: Option<JobOutcome>,
}

impl RetilingLogEntry {
    /// Open a new in-flight entry.
    pub fn start(
        process_id: u32,
        catalog_id: &str,
        tilecluster_id: &str,
        mode: RunMode,
        started_at: DateTime<Utc>,
        geometry: Value,
    ) -> Self {
        Self {
            process_id,
            catalog_id: catalog_id.to_string(),
            tilecluster_id: tilecluster_id.to_string(),
            mode,
            started_at,
            finished_at: None,
            geometry,
            outcome: None,
        }
    }

    /// Build the composite key for the retiling log table.
    pub fn table_key(&self) -> String {
        log_key(self.process_id, &self.tilecluster_id, self.started_at)
    }

    pub fn is_open(&self) -> bool {
        self.finished_at.is_none()
    }

    /// Still open or finished with a failure.
    pub fn needs_retry(&self) -> bool {
        self.is_open() || matches!(self.outcome, Some(JobOutcome::Failed { .. }))
    }
}

/// Composite log key; the timestamp is zero-padded so keys sort by time
/// within a process and cluster.
pub fn log_key(process_id: u32, tilecluster_id: &str, started_at: DateTime<Utc>) -> String {
    format!(
        "{process_id}:{tilecluster_id}:{:020}",
        started_at.timestamp_millis()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn log_key_is_zero_padded() {
        let t = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(log_key(42, "N1-M10", t), "42:N1-M10:00000001700000000123");
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let failed = JobOutcome::Failed {
            reason: "exit code 1".to_string(),
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "exit code 1");
    }
}
