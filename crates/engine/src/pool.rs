// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded worker pool with a rejection-aware backpressure policy
//!
//! Concurrency sits at `core_pool` while the queue is quiet, grows toward
//! `max_pool` under pressure, and shrinks back after `keep_alive` of calm.
//! A submission that finds the queue full is returned to the caller as a
//! typed rejection; the counters feed the load evaluator.

use crate::load::PoolMetrics;
use parking_lot::Mutex;
use pk_core::{Clock, SystemClock};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Sliding window for the rejection-pressure signal.
const REJECTION_WINDOW: Duration = Duration::from_secs(5);

/// Pool sizing knobs.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub core_pool: usize,
    pub max_pool: usize,
    pub keep_alive: Duration,
    pub queue_capacity: usize,
}

impl PoolConfig {
    fn normalized(mut self) -> Self {
        self.core_pool = self.core_pool.max(1);
        self.max_pool = self.max_pool.max(self.core_pool);
        self.queue_capacity = self.queue_capacity.max(1);
        self
    }
}

type JobFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A unit of work submitted to the pool.
pub struct PoolJob {
    label: String,
    future: JobFuture,
}

impl PoolJob {
    pub fn new(label: impl Into<String>, future: impl Future<Output = ()> + Send + 'static) -> Self {
        Self {
            label: label.into(),
            future: Box::pin(future),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for PoolJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolJob").field("label", &self.label).finish()
    }
}

/// A job the pool could not take; the submitter decides what happens next.
#[derive(Debug)]
pub struct RejectedJob(pub PoolJob);

struct PoolInner<C: Clock> {
    semaphore: Arc<Semaphore>,
    queue_tx: mpsc::Sender<PoolJob>,
    pending: AtomicUsize,
    active: AtomicUsize,
    config: PoolConfig,
    /// Permits granted beyond `core_pool`.
    extra: AtomicUsize,
    rejections_total: AtomicU64,
    recent_rejections: Mutex<VecDeque<Instant>>,
    last_pressure: Mutex<Instant>,
    clock: C,
    cancel: CancellationToken,
}

impl<C: Clock> PoolInner<C> {
    fn record_rejection(&self) {
        self.rejections_total.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        let mut recent = self.recent_rejections.lock();
        recent.push_back(now);
        Self::prune(&mut recent, now);
    }

    fn prune(recent: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = recent.front() {
            if now.saturating_duration_since(*front) > REJECTION_WINDOW {
                recent.pop_front();
            } else {
                break;
            }
        }
    }
}

/// The executor: a bounded queue in front of a growable set of workers.
pub struct WorkerPool<C: Clock = SystemClock> {
    inner: Arc<PoolInner<C>>,
    feeder: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool<SystemClock> {
    pub fn new(config: PoolConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> WorkerPool<C> {
    pub fn with_clock(config: PoolConfig, clock: C) -> Self {
        let config = config.normalized();
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
        let inner = Arc::new(PoolInner {
            semaphore: Arc::new(Semaphore::new(config.core_pool)),
            queue_tx,
            pending: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            extra: AtomicUsize::new(0),
            rejections_total: AtomicU64::new(0),
            recent_rejections: Mutex::new(VecDeque::new()),
            last_pressure: Mutex::new(clock.now()),
            config,
            clock,
            cancel: CancellationToken::new(),
        });
        let feeder = tokio::spawn(Self::feed(inner.clone(), queue_rx));
        Self {
            inner,
            feeder: Mutex::new(Some(feeder)),
        }
    }

    /// Submit without blocking.
    ///
    /// Runs immediately when a worker is free, queues while there is room,
    /// and otherwise returns the job as [`RejectedJob`] after bumping the
    /// rejection counters.
    pub fn try_execute(&self, job: PoolJob) -> Result<(), RejectedJob> {
        if self.inner.cancel.is_cancelled() {
            self.inner.record_rejection();
            return Err(RejectedJob(job));
        }
        if let Ok(permit) = self.inner.semaphore.clone().try_acquire_owned() {
            Self::run(self.inner.clone(), job, permit);
            return Ok(());
        }
        match self.inner.queue_tx.try_send(job) {
            Ok(()) => {
                self.inner.pending.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                self.inner.record_rejection();
                debug!(label = job.label(), "executor queue full; rejecting");
                Err(RejectedJob(job))
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                self.inner.record_rejection();
                Err(RejectedJob(job))
            }
        }
    }

    fn run(
        inner: Arc<PoolInner<C>>,
        job: PoolJob,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        inner.active.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(async move {
            job.future.await;
            inner.active.fetch_sub(1, Ordering::Relaxed);
            drop(permit);
        });
    }

    async fn feed(inner: Arc<PoolInner<C>>, mut queue_rx: mpsc::Receiver<PoolJob>) {
        loop {
            let job = tokio::select! {
                _ = inner.cancel.cancelled() => break,
                job = queue_rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            inner.pending.fetch_sub(1, Ordering::Relaxed);
            *inner.last_pressure.lock() = inner.clock.now();

            // Queued work means the core workers are saturated; grow toward
            // max_pool before waiting on a permit.
            let permit = match inner.semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    if inner.extra.load(Ordering::Relaxed)
                        < inner.config.max_pool - inner.config.core_pool
                    {
                        inner.extra.fetch_add(1, Ordering::Relaxed);
                        inner.semaphore.add_permits(1);
                    }
                    let acquired = tokio::select! {
                        _ = inner.cancel.cancelled() => break,
                        acquired = inner.semaphore.clone().acquire_owned() => acquired,
                    };
                    match acquired {
                        Ok(permit) => permit,
                        Err(_) => break,
                    }
                }
            };
            Self::run(inner.clone(), job, permit);

            Self::shrink_if_calm(&inner);
        }
    }

    /// Retire surplus permits once the queue has been calm for `keep_alive`.
    fn shrink_if_calm(inner: &Arc<PoolInner<C>>) {
        let calm_for = inner
            .clock
            .now()
            .saturating_duration_since(*inner.last_pressure.lock());
        if calm_for < inner.config.keep_alive {
            return;
        }
        while inner.extra.load(Ordering::Relaxed) > 0 {
            match inner.semaphore.try_acquire() {
                Ok(permit) => {
                    permit.forget();
                    inner.extra.fetch_sub(1, Ordering::Relaxed);
                }
                Err(_) => break,
            }
        }
    }

    /// Stop taking work and wait for live jobs, up to `grace`.
    pub async fn shutdown(&self, grace: Duration) {
        self.inner.cancel.cancel();
        let feeder = self.feeder.lock().take();
        if let Some(feeder) = feeder {
            let _ = feeder.await;
        }
        let deadline = Instant::now() + grace;
        while self.inner.active.load(Ordering::Relaxed) > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let leftover = self.inner.active.load(Ordering::Relaxed);
        if leftover > 0 {
            info!(leftover, "worker pool stopped with jobs still running");
        }
    }

    pub fn total_rejections(&self) -> u64 {
        self.inner.rejections_total.load(Ordering::Relaxed)
    }

    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::Relaxed)
    }
}

impl<C: Clock> PoolMetrics for WorkerPool<C> {
    fn pending_count(&self) -> usize {
        self.inner.pending.load(Ordering::Relaxed)
    }

    fn active_ratio(&self) -> f64 {
        self.inner.active.load(Ordering::Relaxed) as f64 / self.inner.config.max_pool as f64
    }

    fn recent_rejections(&self) -> usize {
        let now = self.inner.clock.now();
        let mut recent = self.inner.recent_rejections.lock();
        PoolInner::<C>::prune(&mut recent, now);
        recent.len()
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
