//! Map-zone registry and tile-cluster identifiers.
//!
//! A tile cluster id is a `-`-separated list of zone tokens such as
//! `N1-M10-E5-S2-T1`. The first character of each token is the zone
//! kind code, the rest is the zone id within that kind.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between zone tokens in a tile-cluster id.
pub const TOKEN_SEPARATOR: char = '-';

/// Zone kinds known to the selector machinery.
///
/// The declaration order is the canonical encoding order for cluster ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Network,
    Municipality,
    Exploitation,
    Sector,
    State,
    /// Selector-only kind; never part of a cluster id.
    AdditionalExploitation,
}

/// Static description of one zone kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapZone {
    pub kind: ZoneKind,
    /// Single-letter code used in cluster ids.
    pub code: char,
    /// Per-session selector table (unqualified).
    pub selector_table: &'static str,
    /// Id column in the selector table and in the data tables.
    pub id_column: &'static str,
    /// Tab key understood by the set-selector RPC.
    pub tab_name: &'static str,
    /// Whether the kind may appear in a cluster id.
    pub in_cluster_id: bool,
}

static REGISTRY: [MapZone; 6] = [
    MapZone {
        kind: ZoneKind::Network,
        code: 'N',
        selector_table: "selector_network",
        id_column: "network_id",
        tab_name: "tab_network",
        in_cluster_id: true,
    },
    MapZone {
        kind: ZoneKind::Municipality,
        code: 'M',
        selector_table: "selector_municipality",
        id_column: "muni_id",
        tab_name: "tab_municipality",
        in_cluster_id: true,
    },
    MapZone {
        kind: ZoneKind::Exploitation,
        code: 'E',
        selector_table: "selector_expl",
        id_column: "expl_id",
        tab_name: "tab_exploitation",
        in_cluster_id: true,
    },
    MapZone {
        kind: ZoneKind::Sector,
        code: 'S',
        selector_table: "selector_sector",
        id_column: "sector_id",
        tab_name: "tab_sector",
        in_cluster_id: true,
    },
    MapZone {
        kind: ZoneKind::State,
        code: 'T',
        selector_table: "selector_state",
        id_column: "state_id",
        tab_name: "tab_network_state",
        in_cluster_id: true,
    },
    MapZone {
        kind: ZoneKind::AdditionalExploitation,
        code: 'A',
        selector_table: "selector_expl_add",
        id_column: "expl_id",
        tab_name: "tab_exploitation_add",
        in_cluster_id: false,
    },
];

impl MapZone {
    /// Every registered zone, in canonical order.
    pub fn registry() -> &'static [MapZone] {
        &REGISTRY
    }

    /// Look up a zone by its kind.
    pub fn of(kind: ZoneKind) -> &'static MapZone {
        // The registry holds exactly one entry per kind, in declaration order.
        &REGISTRY[kind as usize]
    }

    /// Look up a zone by its single-letter code.
    pub fn by_code(code: char) -> Option<&'static MapZone> {
        REGISTRY.iter().find(|z| z.code == code)
    }
}

impl ZoneKind {
    pub fn zone(self) -> &'static MapZone {
        MapZone::of(self)
    }

    pub fn code(self) -> char {
        self.zone().code
    }
}

impl fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ZoneKind::Network => "network",
            ZoneKind::Municipality => "municipality",
            ZoneKind::Exploitation => "exploitation",
            ZoneKind::Sector => "sector",
            ZoneKind::State => "state",
            ZoneKind::AdditionalExploitation => "additional_exploitation",
        };
        f.write_str(name)
    }
}

/// Errors raised while decoding a tile-cluster id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZoneError {
    #[error("invalid zone kind in token `{token}` of cluster id `{id}`")]
    InvalidZoneKind { id: String, token: String },

    #[error("empty zone id in token `{token}` of cluster id `{id}`")]
    EmptyZoneId { id: String, token: String },

    #[error("zone kind {kind} appears more than once in cluster id `{id}`")]
    DuplicateZoneKind { id: String, kind: ZoneKind },
}

pub type ZoneResult<T> = Result<T, ZoneError>;

/// A parsed tile-cluster id.
///
/// Keeps the raw string (cache, source and layer names are derived from
/// it) and the zone pairs in encounter order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileClusterId {
    raw: String,
    zones: Vec<(ZoneKind, String)>,
}

impl TileClusterId {
    pub fn parse(id: &str) -> ZoneResult<Self> {
        let mut zones: Vec<(ZoneKind, String)> = Vec::new();
        for token in id.split(TOKEN_SEPARATOR) {
            let mut chars = token.chars();
            let Some(code) = chars.next() else {
                return Err(ZoneError::EmptyZoneId {
                    id: id.to_string(),
                    token: token.to_string(),
                });
            };
            let zone = MapZone::by_code(code)
                .filter(|z| z.in_cluster_id)
                .ok_or_else(|| ZoneError::InvalidZoneKind {
                    id: id.to_string(),
                    token: token.to_string(),
                })?;
            let zone_id = chars.as_str();
            if zone_id.is_empty() {
                return Err(ZoneError::EmptyZoneId {
                    id: id.to_string(),
                    token: token.to_string(),
                });
            }
            if zones.iter().any(|(k, _)| *k == zone.kind) {
                return Err(ZoneError::DuplicateZoneKind {
                    id: id.to_string(),
                    kind: zone.kind,
                });
            }
            zones.push((zone.kind, zone_id.to_string()));
        }
        Ok(Self {
            raw: id.to_string(),
            zones,
        })
    }

    /// The id exactly as it was read.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Zone pairs in encounter order.
    pub fn zones(&self) -> &[(ZoneKind, String)] {
        &self.zones
    }

    /// Zone id for a kind, if the cluster carries it.
    pub fn zone(&self, kind: ZoneKind) -> Option<&str> {
        self.zones
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, v)| v.as_str())
    }

    /// Kind-keyed view of the zone pairs.
    pub fn to_map(&self) -> BTreeMap<ZoneKind, &str> {
        self.zones.iter().map(|(k, v)| (*k, v.as_str())).collect()
    }

    /// Re-encode in canonical kind order.
    pub fn canonical(&self) -> String {
        self.to_map()
            .into_iter()
            .map(|(kind, id)| format!("{}{}", kind.code(), id))
            .collect::<Vec<_>>()
            .join(&TOKEN_SEPARATOR.to_string())
    }

    /// SQL predicate restricting rows to this cluster's zones, in
    /// encounter order, e.g. `network_id = '1' AND muni_id = '10'`.
    pub fn zone_predicate(&self) -> String {
        self.zones
            .iter()
            .map(|(kind, id)| {
                format!("{} = '{}'", kind.zone().id_column, id.replace('\'', "''"))
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

impl fmt::Display for TileClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
