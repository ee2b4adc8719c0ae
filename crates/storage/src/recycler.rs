// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ghost-file reclamation for the vault work directory

use crate::index::{Index, IndexEntry};
use fs2::available_space;
use parking_lot::Mutex;
use pk_core::{Clock, Event, RecycleStrategy, StorageLevel};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Free-space source; swapped for a scripted probe in tests.
pub trait SpaceProbe: Send + Sync {
    fn available(&self, path: &Path) -> io::Result<u64>;
}

/// Real filesystem probe.
#[derive(Debug, Clone, Default)]
pub struct DiskSpace;

impl SpaceProbe for DiskSpace {
    fn available(&self, path: &Path) -> io::Result<u64> {
        available_space(path)
    }
}

/// Knobs read from the config store on every sweep.
#[derive(Debug, Clone)]
pub struct RecyclerConfig {
    pub reserved_bytes: u64,
    /// Vault size ceiling; 0 is unlimited.
    pub max_bytes: u64,
    pub warning_enabled: bool,
    pub strategy: RecycleStrategy,
    pub protected_age: Duration,
}

/// Outcome of one sweep: freed byte count and the events to publish.
///
/// The recycler never publishes itself; the owning service broadcasts after
/// the sweep so storage stays bus-free.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub bytes_freed: u64,
    pub events: Vec<Event>,
}

/// Evicts recyclable artifacts when free space runs low.
pub struct Recycler<C: Clock> {
    index: Arc<Index>,
    work_dir: PathBuf,
    probe: Box<dyn SpaceProbe>,
    clock: C,
    /// Level observed by the previous sweep; events fire on edges only.
    last_level: Mutex<Option<StorageLevel>>,
}

impl<C: Clock> Recycler<C> {
    pub fn new(
        index: Arc<Index>,
        work_dir: impl Into<PathBuf>,
        probe: Box<dyn SpaceProbe>,
        clock: C,
    ) -> Self {
        Self {
            index,
            work_dir: work_dir.into(),
            probe,
            clock,
            last_level: Mutex::new(None),
        }
    }

    /// Inspect free space, evict if needed, and sweep empty folders.
    pub fn sweep(&self, config: &RecyclerConfig) -> io::Result<SweepReport> {
        let mut report = SweepReport::default();
        let free = self.probe.available(&self.work_dir)?;
        let critical_floor = config.reserved_bytes / 4;

        let level = if config.reserved_bytes > 0 && free < critical_floor {
            Some(StorageLevel::Critical)
        } else if config.reserved_bytes > 0 && free < config.reserved_bytes {
            Some(StorageLevel::Low)
        } else {
            None
        };
        let used = self.index.artifact_bytes();
        let over_budget = config.max_bytes > 0 && used > config.max_bytes;

        {
            let mut last_level = self.last_level.lock();
            if config.warning_enabled {
                match (level, *last_level) {
                    (Some(level), previous) if previous != Some(level) => {
                        report.events.push(Event::StorageLow {
                            work_dir: self.work_dir.clone(),
                            free,
                            threshold: config.reserved_bytes,
                            level,
                        });
                    }
                    (None, Some(_)) => {
                        report.events.push(Event::StorageRecovered {
                            work_dir: self.work_dir.clone(),
                            free,
                        });
                    }
                    _ => {}
                }
            }
            *last_level = level;
        }

        if level.is_none() && !over_budget {
            return Ok(report);
        }

        let strategy = match config.strategy {
            RecycleStrategy::Auto => {
                if level == Some(StorageLevel::Critical) {
                    RecycleStrategy::SizeFirst
                } else {
                    RecycleStrategy::TimeFirst
                }
            }
            other => other,
        };

        let shortfall = config.reserved_bytes.saturating_sub(free);
        let excess = if config.max_bytes > 0 {
            used.saturating_sub(config.max_bytes)
        } else {
            0
        };
        let goal = shortfall.max(excess);

        let recycled = self.evict(strategy, config.protected_age, goal)?;
        if !recycled.files.is_empty() {
            report.bytes_freed = recycled.bytes_freed;
            report.events.push(Event::FilesRecycled {
                files: recycled.files,
                bytes_freed: recycled.bytes_freed,
                strategy,
            });

            let folders = self.sweep_empty_folders()?;
            if !folders.is_empty() {
                report.events.push(Event::EmptyFoldersDeleted {
                    count: folders.len(),
                    folders,
                });
            }
        }
        Ok(report)
    }

    fn evict(
        &self,
        strategy: RecycleStrategy,
        protected_age: Duration,
        goal: u64,
    ) -> io::Result<Evicted> {
        let now_ms = self.clock.epoch_ms();
        let protected_ms = protected_age.as_millis() as u64;

        let mut candidates: Vec<IndexEntry> = self
            .index
            .snapshot()
            .into_iter()
            .filter(|e| e.destination.is_some())
            .filter(|e| now_ms.saturating_sub(e.inserted_at_ms) >= protected_ms)
            .collect();
        match strategy {
            RecycleStrategy::TimeFirst => candidates.sort_by_key(|e| e.last_access_ms),
            RecycleStrategy::SizeFirst => candidates.sort_by_key(|e| std::cmp::Reverse(e.size)),
            RecycleStrategy::Auto => {}
        }

        let mut out = Evicted::default();
        for entry in candidates {
            if out.bytes_freed >= goal && goal > 0 {
                break;
            }
            let Some(rel) = &entry.destination else {
                continue;
            };
            let artifact = self.work_dir.join(rel);
            match fs::remove_file(&artifact) {
                Ok(()) => {
                    out.bytes_freed += entry.size;
                    out.files.push(artifact);
                    self.index.remove(&entry.key);
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %artifact.display(), "artifact already gone; dropping entry");
                    self.index.remove(&entry.key);
                }
                Err(err) => {
                    warn!(path = %artifact.display(), error = %err, "recycle delete failed");
                }
            }
        }
        Ok(out)
    }

    /// Remove directories left empty by a reclamation pass, deepest first.
    fn sweep_empty_folders(&self) -> io::Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        remove_empty_dirs(&self.work_dir, false, &mut removed)?;
        removed.sort();
        Ok(removed)
    }
}

#[derive(Default)]
struct Evicted {
    files: Vec<PathBuf>,
    bytes_freed: u64,
}

/// Depth-first empty-directory removal; the root itself is kept.
fn remove_empty_dirs(dir: &Path, remove_self: bool, removed: &mut Vec<PathBuf>) -> io::Result<bool> {
    let mut empty = true;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            if !remove_empty_dirs(&path, true, removed)? {
                empty = false;
            }
        } else {
            empty = false;
        }
    }
    if empty && remove_self {
        fs::remove_dir(dir)?;
        removed.push(dir.to_path_buf());
    }
    Ok(empty && remove_self)
}

#[cfg(test)]
#[path = "recycler_tests.rs"]
mod tests;
