// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application assembly: one explicitly constructed context, no globals

use crate::dispatch::CopyDispatcher;
use crate::manager::{DeviceControl, DeviceManager, DiscoveryService};
use crate::saver::IndexSaver;
use crate::scanner::{ScannerService, ScannerSupervisor, TaskSubmitter};
use crate::volumes::VolumeProvider;
use async_trait::async_trait;
use parking_lot::Mutex;
use pk_core::{
    schema, Clock, ConfigError, ConfigStore, CopyOutcome, CopyTask, Event, SystemClock,
};
use pk_engine::{
    CopyEngine, EventBus, LoadEvaluator, PoolConfig, PoolMetrics, RateLimiter, Scheduler,
    Service, ServiceError, ServiceRegistry, SpeedProbe, WorkerPool,
};
use pk_storage::{index_file, DiskSpace, Index, Recycler, SerialStore};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Grace period for in-flight copies at shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Errors from application assembly and startup
#[derive(Debug, Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Filesystem layout of the daemon's own state.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub state_dir: PathBuf,
}

impl AppPaths {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    /// `index_path` from config, resolved against the state dir when
    /// relative.
    fn index_path(&self, config: &ConfigStore) -> PathBuf {
        self.resolve(config.get(&schema::INDEX_PATH))
    }

    fn work_path(&self, config: &ConfigStore) -> PathBuf {
        self.resolve(config.get(&schema::WORK_PATH))
    }

    fn serials_path(&self) -> PathBuf {
        self.state_dir.join("known_serials")
    }

    fn resolve(&self, configured: String) -> PathBuf {
        let path = PathBuf::from(configured);
        if path.is_absolute() {
            path
        } else {
            self.state_dir.join(path)
        }
    }
}

/// Service adapter for the scheduler: starts the dispatcher, and at stop
/// time parks whatever could not be handed off for cancel reporting.
struct SchedulerService<C: Clock> {
    scheduler: Arc<Scheduler<C>>,
    unfinished: Mutex<Vec<CopyTask>>,
}

impl<C: Clock> SchedulerService<C> {
    fn new(scheduler: Arc<Scheduler<C>>) -> Self {
        Self {
            scheduler,
            unfinished: Mutex::new(Vec::new()),
        }
    }

    fn take_unfinished(&self) -> Vec<CopyTask> {
        std::mem::take(&mut *self.unfinished.lock())
    }
}

#[async_trait]
impl<C: Clock> Service for SchedulerService<C> {
    fn name(&self) -> &'static str {
        "scheduler"
    }

    async fn start(&self) -> Result<(), ServiceError> {
        self.scheduler.start();
        Ok(())
    }

    async fn stop(&self) {
        let leftovers = self.scheduler.shutdown().await;
        *self.unfinished.lock() = leftovers;
    }
}

/// The assembled ingest daemon, embedded by the host UI.
///
/// Everything is reachable from this value; components reference each other
/// through the context, never through process-wide statics.
pub struct App<P: VolumeProvider + 'static, C: Clock = SystemClock> {
    config: Arc<ConfigStore>,
    bus: EventBus<C>,
    index: Arc<Index>,
    probe: SpeedProbe<C>,
    limiter: Arc<RateLimiter<C>>,
    pool: Arc<WorkerPool<C>>,
    scheduler: Arc<Scheduler<C>>,
    manager: Arc<DeviceManager<P, C>>,
    scheduler_service: Arc<SchedulerService<C>>,
    registry: ServiceRegistry,
    clock: C,
    work_dir: PathBuf,
    loaded_count: usize,
}

impl<P: VolumeProvider + 'static, C: Clock> App<P, C> {
    /// Assemble the full pipeline. Must run inside the tokio runtime that
    /// will host the services.
    pub fn new(
        config: Arc<ConfigStore>,
        provider: P,
        clock: C,
        paths: AppPaths,
    ) -> Result<Self, AppError> {
        std::fs::create_dir_all(&paths.state_dir)?;
        let work_dir = paths.work_path(&config);
        std::fs::create_dir_all(&work_dir)?;

        let bus = EventBus::with_clock(clock.clone());

        let index = Arc::new(Index::new());
        let index_path = paths.index_path(&config);
        let loaded_count = index_file::load_into(&index_path, &index);

        let probe = SpeedProbe::with_clock(clock.clone());
        let limiter = Arc::new(RateLimiter::with_clock(
            config.get(&schema::COPY_RATE_LIMIT).max(0) as u64,
            config.get(&schema::BURST_SIZE).max(0) as u64,
            clock.clone(),
        ));
        let pool = Arc::new(WorkerPool::with_clock(
            PoolConfig {
                core_pool: config.get(&schema::CORE_POOL).max(1) as usize,
                max_pool: config.get(&schema::MAX_POOL).max(1) as usize,
                keep_alive: Duration::from_secs(
                    config.get(&schema::KEEP_ALIVE_SEC).max(0) as u64
                ),
                queue_capacity: config.get(&schema::QUEUE_CAPACITY).max(1) as usize,
            },
            clock.clone(),
        ));

        let engine = Arc::new(CopyEngine::new(
            index.clone(),
            limiter.clone(),
            probe.clone(),
            bus.clone(),
            config.clone(),
            work_dir.clone(),
            clock.clone(),
        ));
        let sink = Arc::new(CopyDispatcher::new(engine, pool.clone()));

        let depth = Arc::new(AtomicUsize::new(0));
        let evaluator = Arc::new(LoadEvaluator::new(
            depth.clone(),
            pool.clone() as Arc<dyn PoolMetrics>,
            probe.clone(),
            config.clone(),
        ));
        let scheduler = Arc::new(Scheduler::with_depth(
            sink,
            evaluator,
            limiter.clone(),
            config.clone(),
            depth,
        ));

        let manager = Arc::new(DeviceManager::new(
            provider,
            config.clone(),
            bus.clone(),
            SerialStore::new(paths.serials_path()),
        )?);
        let supervisor = ScannerSupervisor::new(
            manager.clone() as Arc<dyn DeviceControl>,
            scheduler.clone() as Arc<dyn TaskSubmitter>,
            config.clone(),
            bus.clone(),
            clock.clone(),
        );
        let recycler = Arc::new(Recycler::new(
            index.clone(),
            work_dir.clone(),
            Box::new(DiskSpace),
            clock.clone(),
        ));
        let saver = IndexSaver::new(
            index.clone(),
            index_path,
            recycler,
            config.clone(),
            bus.clone(),
        );

        // the operator path for raising the ceiling again: a config write
        let weak_config = Arc::downgrade(&config);
        let knob_limiter = limiter.clone();
        config.on_change(move |key| {
            if key != "copy_rate_limit" && key != "burst_size" {
                return;
            }
            if let Some(config) = weak_config.upgrade() {
                knob_limiter.set_limit(
                    config.get(&schema::COPY_RATE_LIMIT).max(0) as u64,
                    config.get(&schema::BURST_SIZE).max(0) as u64,
                );
            }
        });

        let scheduler_service = Arc::new(SchedulerService::new(scheduler.clone()));
        let mut registry = ServiceRegistry::new();
        registry.register(Arc::new(saver));
        registry.register(scheduler_service.clone());
        registry.register(Arc::new(ScannerService::new(supervisor)));
        registry.register(Arc::new(DiscoveryService::new(
            manager.clone(),
            config.clone(),
        )));

        Ok(Self {
            config,
            bus,
            index,
            probe,
            limiter,
            pool,
            scheduler,
            manager,
            scheduler_service,
            registry,
            clock,
            work_dir,
            loaded_count,
        })
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn bus(&self) -> &EventBus<C> {
        &self.bus
    }

    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    pub fn probe(&self) -> &SpeedProbe<C> {
        &self.probe
    }

    pub fn limiter(&self) -> &Arc<RateLimiter<C>> {
        &self.limiter
    }

    pub fn scheduler(&self) -> &Arc<Scheduler<C>> {
        &self.scheduler
    }

    pub fn manager(&self) -> &Arc<DeviceManager<P, C>> {
        &self.manager
    }

    /// Re-hash every artifact against its index key, pruning entries that
    /// no longer hold. The UI's maintenance action; runs off the runtime.
    pub async fn verify_vault(&self) -> pk_storage::VerifyReport {
        let index = self.index.clone();
        let work_dir = self.work_dir.clone();
        let block = self.config.get(&schema::HASH_BUFFER_SIZE).clamp(4096, 1 << 26) as usize;
        tokio::task::spawn_blocking(move || pk_storage::verify_vault(&index, &work_dir, block))
            .await
            .unwrap_or_default()
    }

    /// Start every service in dependency order.
    pub async fn start(&self) -> Result<(), AppError> {
        self.bus.publish(Event::IndexLoaded {
            count: self.loaded_count,
        });
        self.registry.start_all().await?;
        info!(services = ?self.registry.names(), "packrat running");
        Ok(())
    }

    /// Stop services in reverse order, report still-queued tasks as
    /// cancelled, and wind the pool down within the grace period.
    pub async fn shutdown(&self) {
        self.registry.stop_all().await;
        let at_ms = self.clock.epoch_ms();
        for task in self.scheduler_service.take_unfinished() {
            self.bus.publish(Event::CopyCompleted {
                source: task.source,
                destination: None,
                file_size: task.size,
                bytes_copied: 0,
                result: CopyOutcome::Cancel,
                at_ms,
            });
        }
        self.pool.shutdown(SHUTDOWN_GRACE).await;
        info!("packrat stopped");
    }
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;
