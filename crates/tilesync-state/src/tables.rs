//! redb table definitions for the seeding state store.

use redb::TableDefinition;

/// Last successful seed per catalog, keyed by catalog id.
pub const WATERMARKS: TableDefinition<&str, &[u8]> = TableDefinition::new("watermarks");

/// Retiling jobs keyed by `{process_id}:{tilecluster_id}:{started_at_ms}`.
pub const RETILING_LOG: TableDefinition<&str, &[u8]> = TableDefinition::new("retiling_log");
