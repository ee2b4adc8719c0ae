// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The copy engine: checksum-verifying, cancellable, rate-limited transfer
//!
//! A partial copy is never resumed; under content addressing a partial file
//! has the wrong digest, so every interrupted transfer is discarded and
//! re-attempted from scratch.

use crate::bus::EventBus;
use crate::limiter::RateLimiter;
use crate::probe::SpeedProbe;
use pk_core::{schema, Clock, ConfigStore, ContentHasher, CopyOutcome, CopyTask, Event, SystemClock};
use pk_storage::{Index, IndexEntry, InsertOutcome};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

/// Deletes the temp file on drop unless the transfer completed.
struct TempGuard {
    path: PathBuf,
    armed: bool,
}

impl TempGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

enum Transfer {
    Fresh {
        destination: PathBuf,
        bytes: u64,
        total_indexed: usize,
    },
    Duplicate {
        bytes: u64,
    },
    Collision {
        bytes: u64,
    },
    TooLarge {
        size: u64,
    },
    Cancelled {
        bytes: u64,
    },
    Failed {
        error: io::Error,
        bytes: u64,
    },
}

/// Streams files from devices into the vault under dedup.
pub struct CopyEngine<C: Clock = SystemClock> {
    index: Arc<Index>,
    limiter: Arc<RateLimiter<C>>,
    probe: SpeedProbe<C>,
    bus: EventBus<C>,
    config: Arc<ConfigStore>,
    work_dir: PathBuf,
    clock: C,
}

impl<C: Clock> CopyEngine<C> {
    pub fn new(
        index: Arc<Index>,
        limiter: Arc<RateLimiter<C>>,
        probe: SpeedProbe<C>,
        bus: EventBus<C>,
        config: Arc<ConfigStore>,
        work_dir: impl Into<PathBuf>,
        clock: C,
    ) -> Self {
        Self {
            index,
            limiter,
            probe,
            bus,
            config,
            work_dir: work_dir.into(),
            clock,
        }
    }

    pub fn work_dir(&self) -> &std::path::Path {
        &self.work_dir
    }

    /// Copy one file, emitting the protocol events; returns the outcome.
    pub async fn copy_file(&self, task: &CopyTask) -> CopyOutcome {
        let at_ms = self.clock.epoch_ms();
        match self.transfer(task).await {
            Transfer::Fresh {
                destination,
                bytes,
                total_indexed,
            } => {
                self.bus.publish(Event::FileIndexed {
                    path: destination.clone(),
                    size: bytes,
                    total_indexed,
                });
                self.bus.publish(Event::CopyCompleted {
                    source: task.source.clone(),
                    destination: Some(destination),
                    file_size: bytes,
                    bytes_copied: bytes,
                    result: CopyOutcome::Success,
                    at_ms,
                });
                CopyOutcome::Success
            }
            Transfer::Duplicate { bytes } => {
                self.bus.publish(Event::DuplicateDetected {
                    path: task.source.clone(),
                });
                self.bus.publish(Event::CopyCompleted {
                    source: task.source.clone(),
                    destination: None,
                    file_size: bytes,
                    bytes_copied: bytes,
                    result: CopyOutcome::Success,
                    at_ms,
                });
                CopyOutcome::Success
            }
            Transfer::Collision { bytes } => {
                self.bus.publish(Event::CopyCompleted {
                    source: task.source.clone(),
                    destination: None,
                    file_size: bytes,
                    bytes_copied: bytes,
                    result: CopyOutcome::Fail,
                    at_ms,
                });
                CopyOutcome::Fail
            }
            Transfer::TooLarge { size } => {
                debug!(source = %task.source.display(), size, "file exceeds max_file_size");
                self.bus.publish(Event::CopyCompleted {
                    source: task.source.clone(),
                    destination: None,
                    file_size: size,
                    bytes_copied: 0,
                    result: CopyOutcome::Fail,
                    at_ms,
                });
                CopyOutcome::Fail
            }
            Transfer::Cancelled { bytes } => {
                self.bus.publish(Event::CopyCompleted {
                    source: task.source.clone(),
                    destination: None,
                    file_size: task.size,
                    bytes_copied: bytes,
                    result: CopyOutcome::Cancel,
                    at_ms,
                });
                CopyOutcome::Cancel
            }
            Transfer::Failed { error, bytes } => {
                warn!(source = %task.source.display(), error = %error, "copy failed");
                self.bus.publish(Event::CopyCompleted {
                    source: task.source.clone(),
                    destination: None,
                    file_size: task.size,
                    bytes_copied: bytes,
                    result: CopyOutcome::Fail,
                    at_ms,
                });
                CopyOutcome::Fail
            }
        }
    }

    async fn transfer(&self, task: &CopyTask) -> Transfer {
        let timeout =
            Duration::from_millis(self.config.get(&schema::TIMEOUT_MS).max(1) as u64);
        let buffer_size = self.config.get(&schema::BUFFER_SIZE).clamp(4096, 1 << 26) as usize;
        let max_file_size = self.config.get(&schema::MAX_FILE_SIZE).max(0) as u64;

        let stat = match with_timeout(timeout, tokio::fs::metadata(&task.source)).await {
            Ok(stat) => stat,
            Err(error) => return Transfer::Failed { error, bytes: 0 },
        };
        if max_file_size > 0 && stat.len() > max_file_size {
            return Transfer::TooLarge { size: stat.len() };
        }

        let rel_dest = PathBuf::from(task.serial.as_str()).join(&task.rel_path);
        let destination = self.work_dir.join(&rel_dest);
        let Some(parent) = destination.parent() else {
            return Transfer::Failed {
                error: io::Error::other("destination has no parent"),
                bytes: 0,
            };
        };
        if let Err(error) = tokio::fs::create_dir_all(parent).await {
            return Transfer::Failed { error, bytes: 0 };
        }
        let file_name = task
            .rel_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("artifact");
        let tmp_path = parent.join(format!(".{file_name}.{}.part", task.created_ns));
        let guard = TempGuard::new(tmp_path.clone());

        let mut source = match with_timeout(timeout, tokio::fs::File::open(&task.source)).await {
            Ok(file) => file,
            Err(error) => return Transfer::Failed { error, bytes: 0 },
        };
        let mut sink = match with_timeout(timeout, tokio::fs::File::create(&tmp_path)).await {
            Ok(file) => file,
            Err(error) => return Transfer::Failed { error, bytes: 0 },
        };

        // Worker-owned scratch buffer; every exit path drops it with scope.
        let mut buffer = vec![0u8; buffer_size];
        let mut hasher = ContentHasher::new();
        let mut bytes: u64 = 0;
        loop {
            if task.cancel.is_cancelled() {
                return Transfer::Cancelled { bytes };
            }
            let read = match with_timeout(timeout, source.read(&mut buffer)).await {
                Ok(read) => read,
                Err(error) => return Transfer::Failed { error, bytes },
            };
            if read == 0 {
                break;
            }
            if self
                .limiter
                .acquire(read as u64, &task.cancel)
                .await
                .is_err()
            {
                return Transfer::Cancelled { bytes };
            }
            hasher.update(&buffer[..read]);
            if let Err(error) = with_timeout(timeout, sink.write_all(&buffer[..read])).await {
                return Transfer::Failed { error, bytes };
            }
            bytes += read as u64;
            self.probe.record(read as u64);
        }
        if let Err(error) = with_timeout(timeout, sink.flush()).await {
            return Transfer::Failed { error, bytes };
        }
        drop(sink);

        let key = hasher.finalize();
        let now_ms = self.clock.epoch_ms();
        let entry = IndexEntry {
            key,
            size: bytes,
            destination: Some(rel_dest),
            inserted_at_ms: now_ms,
            last_access_ms: now_ms,
        };
        match self.index.insert_if_absent(entry) {
            InsertOutcome::Inserted(total_indexed) => {
                if let Err(error) =
                    with_timeout(timeout, tokio::fs::rename(&tmp_path, &destination)).await
                {
                    // keep the dedup invariant: no entry without its artifact
                    self.index.remove(&key);
                    return Transfer::Failed { error, bytes };
                }
                guard.disarm();
                Transfer::Fresh {
                    destination,
                    bytes,
                    total_indexed,
                }
            }
            InsertOutcome::Duplicate => Transfer::Duplicate { bytes },
            InsertOutcome::Collision => Transfer::Collision { bytes },
        }
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    fut: impl std::future::Future<Output = io::Result<T>>,
) -> io::Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "I/O timed out")),
    }
}

#[cfg(test)]
#[path = "copy_tests.rs"]
mod tests;
