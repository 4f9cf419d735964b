//! Atomic file replacement for documents read by the rendering engine.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{SeedError, SeedResult};

/// Write `bytes` to `path` through a temp file in the same directory and
/// a rename, so readers see either the old or the new file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> SeedResult<()> {
    let io_err = |source| SeedError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

pub fn write_yaml<T: Serialize>(path: &Path, value: &T) -> SeedResult<()> {
    let yaml = serde_yaml::to_string(value).map_err(|e| SeedError::Serialize(e.to_string()))?;
    write_atomic(path, yaml.as_bytes())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> SeedResult<()> {
    let json = serde_json::to_vec(value).map_err(|e| SeedError::Serialize(e.to_string()))?;
    write_atomic(path, &json)
}
