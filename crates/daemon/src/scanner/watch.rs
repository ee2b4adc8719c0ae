// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Phase 2: incremental watch with threshold/timer batching

use super::{walk, SupervisorInner};
use crate::filter::FileFilter;
use indexmap::IndexSet;
use notify::{EventKind, RecursiveMode, Watcher};
use pk_core::{schema, Clock, Serial};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Pending change set for one device.
///
/// The counter grows monotonically between drains; `add` reports when the
/// threshold is crossed and the batch should fire immediately.
#[derive(Debug)]
pub struct WatchBatch {
    pending: IndexSet<PathBuf>,
    threshold: usize,
}

impl WatchBatch {
    pub fn new(threshold: usize) -> Self {
        Self {
            pending: IndexSet::new(),
            threshold: threshold.max(1),
        }
    }

    /// Fold a change in; true means the counter reached the threshold.
    pub fn add(&mut self, path: PathBuf) -> bool {
        self.pending.insert(path);
        self.pending.len() >= self.threshold
    }

    /// Take the pending set in arrival order, resetting the counter.
    pub fn drain(&mut self) -> Vec<PathBuf> {
        self.pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Watch the mount until cancelled, folding notifications into a batch
/// that drains on threshold or timer.
pub(super) async fn watch_mount<C: Clock>(
    inner: Arc<SupervisorInner<C>>,
    serial: Serial,
    mount: PathBuf,
    cancel: CancellationToken,
) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = match notify::recommended_watcher(
        move |result: Result<notify::Event, notify::Error>| {
            let _ = tx.send(result);
        },
    ) {
        Ok(watcher) => watcher,
        Err(err) => {
            warn!(serial = %serial, error = %err, "watcher unavailable");
            return;
        }
    };
    if let Err(err) = watcher.watch(&mount, RecursiveMode::Recursive) {
        warn!(serial = %serial, error = %err, "watch registration failed");
        return;
    }
    debug!(serial = %serial, mount = %mount.display(), "watching");

    let threshold = inner.config.get(&schema::WATCH_THRESHOLD).max(1) as usize;
    let reset =
        Duration::from_secs(inner.config.get(&schema::WATCH_RESET_INTERVAL_SEC).max(1) as u64);
    let mut batch = WatchBatch::new(threshold);
    let mut deadline: Option<tokio::time::Instant> = None;

    loop {
        let timer_at = deadline.unwrap_or_else(|| tokio::time::Instant::now() + reset);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(timer_at), if deadline.is_some() => {
                drain_batch(&inner, &serial, &mount, &mut batch, &cancel).await;
                deadline = None;
            }
            received = rx.recv() => {
                let Some(result) = received else { break };
                match result {
                    Err(err) => warn!(serial = %serial, error = %err, "watch error"),
                    Ok(event) => {
                        if event.need_rescan() {
                            rescan(&inner, &serial, &mount, &cancel).await;
                            continue;
                        }
                        if !matches!(
                            event.kind,
                            EventKind::Create(_) | EventKind::Modify(_)
                        ) {
                            continue;
                        }
                        for path in event.paths {
                            if batch.add(path) {
                                drain_batch(&inner, &serial, &mount, &mut batch, &cancel).await;
                                deadline = None;
                            }
                        }
                        if !batch.is_empty() && deadline.is_none() {
                            deadline = Some(tokio::time::Instant::now() + reset);
                        }
                    }
                }
            }
        }
    }
}

/// Re-filter and re-submit everything pending.
async fn drain_batch<C: Clock>(
    inner: &Arc<SupervisorInner<C>>,
    serial: &Serial,
    mount: &Path,
    batch: &mut WatchBatch,
    cancel: &CancellationToken,
) {
    let paths = batch.drain();
    if paths.is_empty() {
        return;
    }
    debug!(serial = %serial, count = paths.len(), "watch batch drains");
    let filter = FileFilter::from_config(&inner.config);
    for path in paths {
        if cancel.is_cancelled() {
            return;
        }
        if let Some(task) =
            walk::task_for_path(mount, serial, &path, &filter, &inner.clock, cancel)
        {
            inner.submitter.submit_task(task);
        }
    }
}

/// Overflow recovery: the notifier lost events, so the walk runs again.
/// Already-copied files dedup away at the index.
async fn rescan<C: Clock>(
    inner: &Arc<SupervisorInner<C>>,
    serial: &Serial,
    mount: &Path,
    cancel: &CancellationToken,
) {
    warn!(serial = %serial, mount = %mount.display(), "watch overflow; re-walking");
    let filter = FileFilter::from_config(&inner.config);
    let result = walk::walk_blocking(
        mount.to_path_buf(),
        serial.clone(),
        filter,
        inner.clock.clone(),
        inner.submitter.clone(),
        cancel.clone(),
    )
    .await;
    if let Err(err) = result {
        warn!(serial = %serial, error = %err, "overflow re-walk failed");
    }
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
