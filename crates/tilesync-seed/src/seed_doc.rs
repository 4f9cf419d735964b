//! Scoped seed document: one task, one cache, one optional coverage.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::coverage::Coverage;
use crate::error::SeedResult;
use crate::persist::write_yaml;

/// Seed task name passed to the engine.
pub const SEED_TASK: &str = "seed_prog";

/// Coverage name referenced by the seed task.
pub const MAIN_COVERAGE: &str = "main_coverage";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeedDocument {
    pub seeds: BTreeMap<String, SeedTask>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub coverages: BTreeMap<String, Coverage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeedTask {
    pub caches: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub coverages: Vec<String>,
    pub grids: Vec<String>,
    pub refresh_before: RefreshBefore,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<Levels>,
}

/// Tiles older than this are re-rendered; zero minutes means all of them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RefreshBefore {
    pub minutes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Levels {
    pub to: u32,
}

impl SeedDocument {
    pub fn new(cache: String, grid: String, coverage: Option<Coverage>, max_level: Option<u32>) -> Self {
        let mut coverages = BTreeMap::new();
        if let Some(coverage) = coverage {
            coverages.insert(MAIN_COVERAGE.to_string(), coverage);
        }
        let task = SeedTask {
            caches: vec![cache],
            coverages: coverages.keys().cloned().collect(),
            grids: vec![grid],
            refresh_before: RefreshBefore { minutes: 0 },
            levels: max_level.map(|to| Levels { to }),
        };
        Self {
            seeds: BTreeMap::from([(SEED_TASK.to_string(), task)]),
            coverages,
        }
    }

    /// `<scratch_dir>/<catalog>_seed.yaml`
    pub fn path_for(scratch_dir: &Path, catalog_id: &str) -> PathBuf {
        scratch_dir.join(format!("{catalog_id}_seed.yaml"))
    }

    pub fn write(&self, path: &Path) -> SeedResult<()> {
        write_yaml(path, self)
    }
}
