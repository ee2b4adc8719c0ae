// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The dispatcher: tick loop, batch decisions, rate adjustment, FIFO
//! fallback

use super::{SchedulerError, SchedulerInner};
use pk_core::{schema, Clock, CopyTask, LoadLevel};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Cap on how many ticks the normal path stays parked after repeated
/// failures.
const MAX_BACKOFF_TICKS: u32 = 5;

/// Background loop: initial delay, then one tick per interval until
/// cancelled.
pub(super) async fn run<C: Clock>(inner: Arc<SchedulerInner<C>>) {
    let initial = Duration::from_millis(inner.config.get(&schema::INITIAL_DELAY_MS).max(0) as u64);
    tokio::select! {
        _ = inner.cancel.cancelled() => return,
        _ = tokio::time::sleep(initial) => {}
    }
    loop {
        let interval =
            Duration::from_millis(inner.config.get(&schema::TICK_INTERVAL_MS).max(1) as u64);
        inner.tick();
        tokio::select! {
            _ = inner.cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

impl<C: Clock> SchedulerInner<C> {
    /// One dispatcher pass. Every failure is caught here: the scheduler
    /// falls back to direct FIFO dispatch rather than stalling the queue.
    pub(crate) fn tick(&self) {
        let backoff = self.probe_backoff.load(Ordering::Relaxed);
        if backoff > 0 {
            self.probe_backoff.store(backoff - 1, Ordering::Relaxed);
            self.fifo_drain();
            return;
        }
        match self.try_tick() {
            Ok(()) => {
                self.degraded.store(false, Ordering::Relaxed);
                self.failure_streak.store(0, Ordering::Relaxed);
            }
            Err(err) => {
                let streak = self.failure_streak.fetch_add(1, Ordering::Relaxed) + 1;
                error!(error = %err, streak, "dispatch tick failed; using FIFO fallback");
                self.degraded.store(true, Ordering::Relaxed);
                if streak >= 2 {
                    self.probe_backoff
                        .store((streak - 1).min(MAX_BACKOFF_TICKS), Ordering::Relaxed);
                }
                self.fifo_drain();
            }
        }
    }

    fn try_tick(&self) -> Result<(), SchedulerError> {
        let score = self.load.evaluate()?;
        self.adjust_rate(score.level);

        if score.level == LoadLevel::High {
            // Accumulation mode: let the queue build until load subsides.
            if !self.accumulating.swap(true, Ordering::Relaxed) {
                info!(score = score.score, "high load; accumulating");
            }
            let high_batch = self.config.get(&schema::HIGH_BATCH).max(0) as usize;
            if high_batch > 0 {
                self.dispatch_batch(high_batch);
            }
            return Ok(());
        }
        if self.accumulating.swap(false, Ordering::Relaxed) {
            info!(score = score.score, "load subsided; draining");
        }

        if score.level == LoadLevel::Low {
            let threshold = self
                .config
                .get(&schema::HIGH_PRIORITY_THRESHOLD)
                .clamp(0, 100) as u8;
            if !self.dispatch_urgent(threshold) {
                return Ok(());
            }
        }

        let budget = match score.level {
            LoadLevel::Low => self.config.get(&schema::LOW_BATCH),
            LoadLevel::Medium => self.config.get(&schema::MEDIUM_BATCH),
            LoadLevel::High => 0,
        }
        .max(0) as usize;
        self.dispatch_batch(budget);
        Ok(())
    }

    /// Under LOW load, anything at or above the threshold ships regardless
    /// of the batch budget. Returns false if the executor pushed back.
    fn dispatch_urgent(&self, threshold: u8) -> bool {
        loop {
            let task = {
                let mut queue = self.queue.lock();
                let urgent = queue.peek().is_some_and(|t| t.priority >= threshold);
                if urgent {
                    queue.pop()
                } else {
                    None
                }
            };
            let Some(task) = task else {
                self.sync_depth();
                return true;
            };
            if task.is_cancelled() {
                continue;
            }
            if let Err(task) = self.sink.try_execute(task) {
                self.reinsert(task);
                return false;
            }
        }
    }

    /// Drain up to `budget` tasks in priority order, stopping at the first
    /// executor rejection.
    fn dispatch_batch(&self, budget: usize) {
        let mut dispatched = 0;
        while dispatched < budget {
            let task = { self.queue.lock().pop() };
            let Some(task) = task else { break };
            if task.is_cancelled() {
                continue;
            }
            match self.sink.try_execute(task) {
                Ok(()) => dispatched += 1,
                Err(task) => {
                    // Graceful degradation: the task goes back to the head
                    // of its priority class, nothing is dropped.
                    self.reinsert(task);
                    break;
                }
            }
        }
        self.sync_depth();
    }

    /// FIFO fallback: creation order only, no load logic.
    fn fifo_drain(&self) {
        let mut tasks: Vec<CopyTask> = {
            let mut queue = self.queue.lock();
            let drained = std::mem::take(&mut *queue);
            drained.into_vec()
        };
        tasks.sort_by_key(|t| t.created_ns);

        let mut iter = tasks.into_iter();
        let mut returned = Vec::new();
        for task in iter.by_ref() {
            if task.is_cancelled() {
                continue;
            }
            if let Err(task) = self.sink.try_execute(task) {
                returned.push(task);
                break;
            }
        }
        returned.extend(iter);
        if !returned.is_empty() {
            let mut queue = self.queue.lock();
            for task in returned {
                queue.push(task);
            }
        }
        self.sync_depth();
    }

    /// Conservative, monotonic-down rate adjustment. The ceiling only ever
    /// moves down within a session; raising it back is the operator's call.
    fn adjust_rate(&self, level: LoadLevel) {
        if !self.config.get(&schema::AUTO_MODE_ENABLED) {
            return;
        }
        let base = self.config.get(&schema::COPY_RATE_LIMIT_BASE).max(0) as u64;
        if base == 0 {
            return;
        }
        let percent = match level {
            LoadLevel::Low => self.config.get(&schema::LOW_PERCENT),
            LoadLevel::Medium => self.config.get(&schema::MEDIUM_PERCENT),
            LoadLevel::High => self.config.get(&schema::HIGH_PERCENT),
        }
        .clamp(0, 100) as u64;
        let target = base * percent / 100;
        let current = self.limiter.current_rate();
        if current == 0 || target < current {
            let burst = self.config.get(&schema::BURST_SIZE).max(0) as u64;
            self.limiter.set_limit(target, burst);
            debug!(target, level = %level, "copy rate ceiling lowered");
        }
    }

    fn reinsert(&self, task: CopyTask) {
        let mut queue = self.queue.lock();
        queue.push(task);
        self.depth.store(queue.len(), Ordering::Relaxed);
    }

    fn sync_depth(&self) {
        let len = self.queue.lock().len();
        self.depth.store(len, Ordering::Relaxed);
    }
}
