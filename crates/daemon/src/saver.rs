// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic index persistence and the recycler sweep

use async_trait::async_trait;
use parking_lot::Mutex;
use pk_core::{schema, Clock, ConfigStore, Event, RecycleStrategy, SystemClock};
use pk_engine::{EventBus, Service, ServiceError};
use pk_storage::{index_file, Index, Recycler, RecyclerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Saves the index when dirty and runs the storage guard on the same
/// cadence.
pub struct IndexSaver<C: Clock = SystemClock> {
    index: Arc<Index>,
    index_path: PathBuf,
    recycler: Arc<Recycler<C>>,
    config: Arc<ConfigStore>,
    bus: EventBus<C>,
    cancel: Mutex<CancellationToken>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Clock> IndexSaver<C> {
    pub fn new(
        index: Arc<Index>,
        index_path: PathBuf,
        recycler: Arc<Recycler<C>>,
        config: Arc<ConfigStore>,
        bus: EventBus<C>,
    ) -> Self {
        Self {
            index,
            index_path,
            recycler,
            config,
            bus,
            cancel: Mutex::new(CancellationToken::new()),
            handle: Mutex::new(None),
        }
    }

    fn recycler_config(config: &ConfigStore) -> RecyclerConfig {
        RecyclerConfig {
            reserved_bytes: config.get(&schema::RESERVED_BYTES).max(0) as u64,
            max_bytes: config.get(&schema::MAX_BYTES).max(0) as u64,
            warning_enabled: config.get(&schema::WARNING_ENABLED),
            strategy: config
                .get(&schema::RECYCLER_STRATEGY)
                .parse()
                .unwrap_or(RecycleStrategy::Auto),
            protected_age: Duration::from_secs(
                config.get(&schema::PROTECTED_AGE_HOURS).max(0) as u64 * 3600,
            ),
        }
    }

    /// Save if dirty, then sweep. Also the shutdown path's final pass.
    fn save_and_sweep(
        index: &Index,
        index_path: &std::path::Path,
        recycler: &Recycler<C>,
        config: &ConfigStore,
        bus: &EventBus<C>,
    ) {
        if index.take_dirty() {
            match index_file::save(index_path, index) {
                Ok(count) => {
                    bus.publish(Event::IndexSaved { count });
                }
                Err(err) => {
                    // stay dirty so the next tick retries
                    index.mark_dirty();
                    error!(error = %err, "index save failed");
                }
            }
        }
        match recycler.sweep(&Self::recycler_config(config)) {
            Ok(report) => {
                for event in report.events {
                    bus.publish(event);
                }
            }
            Err(err) => error!(error = %err, "recycler sweep failed"),
        }
    }
}

#[async_trait]
impl<C: Clock> Service for IndexSaver<C> {
    fn name(&self) -> &'static str {
        "index-saver"
    }

    async fn start(&self) -> Result<(), ServiceError> {
        let index = self.index.clone();
        let index_path = self.index_path.clone();
        let recycler = self.recycler.clone();
        let config = self.config.clone();
        let bus = self.bus.clone();
        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();

        let handle = tokio::spawn(async move {
            let initial =
                Duration::from_secs(config.get(&schema::SAVE_INITIAL_DELAY_SEC).max(0) as u64);
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(initial) => {}
            }
            loop {
                Self::save_and_sweep(&index, &index_path, &recycler, &config, &bus);
                let interval =
                    Duration::from_secs(config.get(&schema::SAVE_INTERVAL_SEC).max(1) as u64);
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    async fn stop(&self) {
        self.cancel.lock().cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        // final save so a clean shutdown loses nothing
        if self.index.take_dirty() {
            match index_file::save(&self.index_path, &self.index) {
                Ok(count) => {
                    info!(count, "final index save");
                    self.bus.publish(Event::IndexSaved { count });
                }
                Err(err) => error!(error = %err, "final index save failed"),
            }
        }
    }
}

#[cfg(test)]
#[path = "saver_tests.rs"]
mod tests;
