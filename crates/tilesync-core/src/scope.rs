//! Selector scope requests.

use serde::{Deserialize, Serialize};

use crate::zone::{TileClusterId, ZoneKind};

/// What to select for one zone kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeValue {
    SelectAll,
    Ids(Vec<String>),
}

/// One entry of a scope request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeEntry {
    pub zone: ZoneKind,
    pub value: ScopeValue,
}

impl ScopeEntry {
    pub fn select_all(zone: ZoneKind) -> Self {
        Self {
            zone,
            value: ScopeValue::SelectAll,
        }
    }

    pub fn ids<I, S>(zone: ZoneKind, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            zone,
            value: ScopeValue::Ids(ids.into_iter().map(Into::into).collect()),
        }
    }
}

/// Full scope for a single cluster: one explicit id per zone it carries.
pub fn cluster_scope(id: &TileClusterId) -> Vec<ScopeEntry> {
    id.zones()
        .iter()
        .map(|(kind, zone_id)| ScopeEntry::ids(*kind, [zone_id.clone()]))
        .collect()
}
