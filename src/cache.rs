//! On-disk copies of the raw fetched records.
//!
//! A fetching run writes both files so a later run can upload straight from
//! them. Each write replaces the file wholesale through a temp file in the
//! same directory.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{error, info};

pub const HIGHLIGHTS_CACHE_FILE: &str = "highlights_info.json";
pub const DOCUMENTS_CACHE_FILE: &str = "reader_info.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePaths {
    pub highlights: PathBuf,
    pub documents: PathBuf,
}

impl CachePaths {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            highlights: dir.join(HIGHLIGHTS_CACHE_FILE),
            documents: dir.join(DOCUMENTS_CACHE_FILE),
        }
    }
}

impl Default for CachePaths {
    fn default() -> Self {
        Self::in_dir(".")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cache file {path:?} is not a JSON array of records: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub fn write_records(path: &Path, records: &[Value]) -> Result<(), CacheError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| CacheError::io(dir, e))?;

    let json = serde_json::to_vec(records).map_err(|e| CacheError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| CacheError::io(path, e))?;
    tmp.write_all(&json).map_err(|e| CacheError::io(path, e))?;
    tmp.persist(path).map_err(|e| {
        error!(error = ?e.error, path = %path.display(), "Failed to persist cache file");
        CacheError::io(path, e.error)
    })?;

    info!(path = %path.display(), records = records.len(), "Wrote cache file");
    Ok(())
}

pub fn read_records(path: &Path) -> Result<Vec<Value>, CacheError> {
    let content = fs::read_to_string(path).map_err(|e| {
        error!(error = ?e, path = %path.display(), "Failed to read cache file");
        CacheError::io(path, e)
    })?;
    let records: Vec<Value> = serde_json::from_str(&content).map_err(|e| CacheError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    info!(path = %path.display(), records = records.len(), "Loaded cache file");
    Ok(records)
}
