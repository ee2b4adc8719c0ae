// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Priority scheduling core: ordered queue, adaptive dispatcher, rate
//! adjustment

mod dispatcher;
mod priority;

pub use priority::priority_for;

use crate::limiter::RateLimiter;
use crate::load::{LoadProbe, LoadProbeError};
use parking_lot::Mutex;
use pk_core::{Clock, ConfigStore, CopyTask, SystemClock};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Errors inside a dispatcher tick; any of these flips the scheduler into
/// FIFO fallback for the tick.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Load(#[from] LoadProbeError),
}

/// Submission refused because shutdown already began; the task comes back.
#[derive(Debug, Error)]
#[error("scheduler is shut down")]
pub struct SubmitRejected(pub CopyTask);

/// Where dispatched tasks go. The executor returns a task it cannot take,
/// and the scheduler reinserts it at the head of the queue.
pub trait TaskSink: Send + Sync {
    fn try_execute(&self, task: CopyTask) -> Result<(), CopyTask>;
}

pub(crate) struct SchedulerInner<C: Clock> {
    pub(crate) queue: Mutex<BinaryHeap<CopyTask>>,
    pub(crate) depth: Arc<AtomicUsize>,
    pub(crate) sink: Arc<dyn TaskSink>,
    pub(crate) load: Arc<dyn LoadProbe>,
    pub(crate) limiter: Arc<RateLimiter<C>>,
    pub(crate) config: Arc<ConfigStore>,
    pub(crate) accumulating: AtomicBool,
    pub(crate) degraded: AtomicBool,
    pub(crate) failure_streak: AtomicU32,
    /// Ticks left before the normal path is attempted again after repeated
    /// failures.
    pub(crate) probe_backoff: AtomicU32,
    pub(crate) shutting_down: AtomicBool,
    pub(crate) cancel: CancellationToken,
}

/// The scheduling core. `submit` is O(log n) under one lock and never
/// blocks; a single dispatcher task drains by (priority desc, creation
/// nanos asc) in load-sized batches.
pub struct Scheduler<C: Clock = SystemClock> {
    inner: Arc<SchedulerInner<C>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(
        sink: Arc<dyn TaskSink>,
        load: Arc<dyn LoadProbe>,
        limiter: Arc<RateLimiter<C>>,
        config: Arc<ConfigStore>,
    ) -> Self {
        Self::with_depth(sink, load, limiter, config, Arc::new(AtomicUsize::new(0)))
    }

    /// Like [`Scheduler::new`], sharing an externally created pending-count
    /// cell so the load evaluator can be built first.
    pub fn with_depth(
        sink: Arc<dyn TaskSink>,
        load: Arc<dyn LoadProbe>,
        limiter: Arc<RateLimiter<C>>,
        config: Arc<ConfigStore>,
        depth: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                queue: Mutex::new(BinaryHeap::new()),
                depth,
                sink,
                load,
                limiter,
                config,
                accumulating: AtomicBool::new(false),
                degraded: AtomicBool::new(false),
                failure_streak: AtomicU32::new(0),
                probe_backoff: AtomicU32::new(0),
                shutting_down: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
            dispatcher: Mutex::new(None),
        }
    }

    /// Shared pending-count cell, read by the load evaluator.
    pub fn depth_handle(&self) -> Arc<AtomicUsize> {
        self.inner.depth.clone()
    }

    /// Enqueue a task. Never blocks and never rejects while running.
    pub fn submit(&self, task: CopyTask) -> Result<(), SubmitRejected> {
        if self.inner.shutting_down.load(Ordering::Acquire) {
            return Err(SubmitRejected(task));
        }
        let mut queue = self.inner.queue.lock();
        queue.push(task);
        self.inner.depth.store(queue.len(), Ordering::Relaxed);
        Ok(())
    }

    pub fn pending_count(&self) -> usize {
        self.inner.depth.load(Ordering::Relaxed)
    }

    /// Whether the last tick saw HIGH load and is letting the queue build.
    pub fn is_accumulating(&self) -> bool {
        self.inner.accumulating.load(Ordering::Relaxed)
    }

    /// Whether the dispatcher is in FIFO fallback.
    pub fn is_degraded(&self) -> bool {
        self.inner.degraded.load(Ordering::Relaxed)
    }

    /// One dispatcher pass. The background loop calls this on every tick;
    /// tests drive it directly for determinism.
    pub fn tick(&self) {
        self.inner.tick();
    }

    /// Spawn the dispatcher loop (initial delay, then the tick interval).
    pub fn start(&self) {
        let mut dispatcher = self.dispatcher.lock();
        if dispatcher.is_some() {
            return;
        }
        *dispatcher = Some(tokio::spawn(dispatcher::run(self.inner.clone())));
    }

    /// Stop accepting tasks, drain what the executor will take, cancel the
    /// rest, and return them for completion reporting.
    pub async fn shutdown(&self) -> Vec<CopyTask> {
        self.inner.shutting_down.store(true, Ordering::Release);
        self.inner.cancel.cancel();
        let dispatcher = self.dispatcher.lock().take();
        if let Some(handle) = dispatcher {
            let _ = handle.await;
        }

        let mut leftovers = Vec::new();
        let mut rejected = false;
        loop {
            let task = { self.inner.queue.lock().pop() };
            let Some(task) = task else { break };
            if task.is_cancelled() {
                continue;
            }
            if rejected {
                leftovers.push(task);
                continue;
            }
            if let Err(task) = self.inner.sink.try_execute(task) {
                rejected = true;
                leftovers.push(task);
            }
        }
        for task in &leftovers {
            task.cancel.cancel();
        }
        self.inner.depth.store(0, Ordering::Relaxed);
        leftovers
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
