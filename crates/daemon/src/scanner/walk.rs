// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Phase 1: the initial depth-first traversal

use super::TaskSubmitter;
use crate::filter::FileFilter;
use pk_core::paths::{device_relative, is_hidden};
use pk_core::{Clock, CopyTask, Serial};
use pk_engine::priority_for;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use walkdir::WalkDir;

/// What one traversal produced.
#[derive(Debug, Default)]
pub(super) struct WalkReport {
    pub submitted: usize,
    /// Paths that failed transiently; the retry queue takes them.
    pub failed: Vec<PathBuf>,
}

/// Run the blocking traversal off the async runtime.
pub(super) async fn walk_blocking<C: Clock>(
    mount: PathBuf,
    serial: Serial,
    filter: FileFilter,
    clock: C,
    submitter: Arc<dyn TaskSubmitter>,
    cancel: CancellationToken,
) -> io::Result<WalkReport> {
    tokio::task::spawn_blocking(move || {
        walk_mount(&mount, &serial, &filter, &clock, submitter.as_ref(), &cancel)
    })
    .await
    .map_err(|join| io::Error::other(join.to_string()))?
}

/// Depth-first visit of every regular file under `mount`.
///
/// A failure on the mount root is fatal (the device is unreadable); a
/// failure below it only parks that path for retry.
pub(super) fn walk_mount<C: Clock>(
    mount: &Path,
    serial: &Serial,
    filter: &FileFilter,
    clock: &C,
    submitter: &dyn TaskSubmitter,
    cancel: &CancellationToken,
) -> io::Result<WalkReport> {
    let mut report = WalkReport::default();
    let include_hidden = filter.include_hidden();

    let walker = WalkDir::new(mount)
        .follow_links(!filter.skip_symlinks())
        .into_iter()
        .filter_entry(move |entry| {
            entry.depth() == 0 || include_hidden || !is_hidden(entry.path())
        });

    for entry in walker {
        if cancel.is_cancelled() {
            break;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf);
                let is_root = path.as_deref() == Some(mount) || err.depth() == 0;
                if is_root {
                    return Err(err
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::other("mount enumeration failed")));
                }
                if let Some(path) = path {
                    debug!(path = %path.display(), "walk error; queued for retry");
                    report.failed.push(path);
                }
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(_) => {
                report.failed.push(path.to_path_buf());
                continue;
            }
        };
        if !filter.accepts(path, &meta, SystemTime::now()) {
            continue;
        }
        if let Some(task) = build_task(mount, serial, path, meta.len(), clock, cancel) {
            if submitter.submit_task(task) {
                report.submitted += 1;
            }
        }
    }
    Ok(report)
}

/// Re-evaluate one path, as the retry queue and watch drains do.
pub(super) fn task_for_path<C: Clock>(
    mount: &Path,
    serial: &Serial,
    path: &Path,
    filter: &FileFilter,
    clock: &C,
    cancel: &CancellationToken,
) -> Option<CopyTask> {
    let meta = std::fs::symlink_metadata(path).ok()?;
    if !meta.is_file() {
        return None;
    }
    if !filter.accepts(path, &meta, SystemTime::now()) {
        return None;
    }
    build_task(mount, serial, path, meta.len(), clock, cancel)
}

fn build_task<C: Clock>(
    mount: &Path,
    serial: &Serial,
    path: &Path,
    size: u64,
    clock: &C,
    cancel: &CancellationToken,
) -> Option<CopyTask> {
    let rel_path = device_relative(mount, path)?;
    Some(CopyTask {
        source: path.to_path_buf(),
        rel_path,
        serial: serial.clone(),
        size,
        priority: priority_for(path, size),
        created_ns: clock.monotonic_ns(),
        cancel: cancel.child_token(),
    })
}

#[cfg(test)]
#[path = "walk_tests.rs"]
mod tests;
