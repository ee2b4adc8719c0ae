// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Index persistence: versioned JSON, written atomically
//!
//! Recovery loads the whole file; a malformed or wrong-version file yields
//! an empty index and a severe log, never a crash.

use crate::fs_util::write_atomic;
use crate::index::{Index, IndexEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};

/// Current index file schema version
pub const INDEX_VERSION: u32 = 1;

/// Errors from index persistence
#[derive(Debug, Error)]
pub enum IndexFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported index version {0}")]
    UnsupportedVersion(u32),
}

/// On-disk form of the index.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexFile {
    #[serde(rename = "v")]
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub entries: Vec<IndexEntry>,
}

/// Serialize a snapshot of `index` to `path`, returning the entry count.
pub fn save(path: &Path, index: &Index) -> Result<usize, IndexFileError> {
    let entries = index.snapshot();
    let count = entries.len();
    let file = IndexFile {
        version: INDEX_VERSION,
        saved_at: Utc::now(),
        entries,
    };
    let body = serde_json::to_vec(&file)?;
    write_atomic(path, &body)?;
    Ok(count)
}

/// Read the file at `path` strictly.
pub fn load(path: &Path) -> Result<Option<IndexFile>, IndexFileError> {
    if !path.exists() {
        return Ok(None);
    }
    let body = fs::read(path)?;
    let file: IndexFile = serde_json::from_slice(&body)?;
    if file.version != INDEX_VERSION {
        return Err(IndexFileError::UnsupportedVersion(file.version));
    }
    Ok(Some(file))
}

/// Populate `index` from `path`, starting empty on any load failure.
///
/// Returns the number of entries hydrated.
pub fn load_into(path: &Path, index: &Index) -> usize {
    match load(path) {
        Ok(Some(file)) => {
            let count = index.hydrate(file.entries);
            info!(path = %path.display(), count, "index loaded");
            count
        }
        Ok(None) => 0,
        Err(err) => {
            error!(path = %path.display(), error = %err, "index load failed; starting empty");
            index.hydrate(Vec::new());
            0
        }
    }
}

#[cfg(test)]
#[path = "index_file_tests.rs"]
mod tests;
