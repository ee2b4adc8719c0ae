// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Vault integrity verification
//!
//! Re-hashes every artifact against its index key. Entries whose artifact
//! vanished or no longer matches its digest are dropped from the index so
//! the content can be ingested again; the artifact of a mismatch is
//! deleted, it is not the bytes the key promises.

use crate::index::Index;
use pk_core::{ChecksumKey, ContentHasher};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// What a verification pass found.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub checked: usize,
    /// Entries whose artifact file no longer exists.
    pub missing: Vec<PathBuf>,
    /// Entries whose artifact no longer hashes to its key.
    pub corrupt: Vec<PathBuf>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.corrupt.is_empty()
    }
}

/// Digest one file in `block_size` reads.
pub fn hash_file(path: &Path, block_size: usize) -> io::Result<ChecksumKey> {
    let mut file = File::open(path)?;
    let mut hasher = ContentHasher::new();
    let mut buffer = vec![0u8; block_size.max(4096)];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize())
}

/// Walk every live entry and confirm its artifact still matches its key.
///
/// Blocking; callers run it off the async runtime. The index is pruned as
/// problems are found, never the other way around, so a concurrent insert
/// of fresh content is unaffected.
pub fn verify_vault(index: &Index, work_dir: &Path, block_size: usize) -> VerifyReport {
    let mut report = VerifyReport::default();
    for entry in index.snapshot() {
        let Some(rel) = &entry.destination else {
            continue;
        };
        let artifact = work_dir.join(rel);
        report.checked += 1;
        match hash_file(&artifact, block_size) {
            Ok(key) if key == entry.key => {}
            Ok(key) => {
                error!(
                    path = %artifact.display(),
                    expected = %entry.key,
                    actual = %key,
                    "artifact does not match its key"
                );
                let _ = std::fs::remove_file(&artifact);
                index.remove(&entry.key);
                report.corrupt.push(artifact);
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(path = %artifact.display(), "artifact missing; dropping entry");
                index.remove(&entry.key);
                report.missing.push(artifact);
            }
            Err(err) => {
                warn!(path = %artifact.display(), error = %err, "artifact unreadable");
            }
        }
    }
    if report.is_clean() {
        info!(checked = report.checked, "vault verified");
    } else {
        warn!(
            checked = report.checked,
            missing = report.missing.len(),
            corrupt = report.corrupt.len(),
            "vault verification pruned entries"
        );
    }
    report
}

#[cfg(test)]
#[path = "verify_tests.rs"]
mod tests;
