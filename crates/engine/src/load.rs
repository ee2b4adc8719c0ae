// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rejection-aware composite load evaluator

use crate::probe::SpeedProbe;
use pk_core::{schema, Clock, ConfigStore, LoadScore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Error surfaced when a load snapshot cannot be produced.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("load probe failed: {0}")]
pub struct LoadProbeError(pub String);

/// Source of load snapshots for the scheduler.
pub trait LoadProbe: Send + Sync {
    fn evaluate(&self) -> Result<LoadScore, LoadProbeError>;
}

/// Executor metrics the evaluator reads; implemented by the worker pool.
pub trait PoolMetrics: Send + Sync {
    /// Tasks waiting in the bounded queue.
    fn pending_count(&self) -> usize;
    /// Active workers over the maximum pool size, 0.0..=1.0.
    fn active_ratio(&self) -> f64;
    /// Rejections inside the sliding window.
    fn recent_rejections(&self) -> usize;
}

/// Signal weights, each the cap of its normalized contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadWeights {
    pub queue: u8,
    pub speed: u8,
    pub thread: u8,
    pub rejection: u8,
}

impl LoadWeights {
    pub fn from_config(config: &ConfigStore) -> Self {
        Self {
            queue: config.get(&schema::QUEUE_WEIGHT).clamp(0, 100) as u8,
            speed: config.get(&schema::SPEED_WEIGHT).clamp(0, 100) as u8,
            thread: config.get(&schema::THREAD_WEIGHT).clamp(0, 100) as u8,
            rejection: config.get(&schema::REJECTION_WEIGHT).clamp(0, 100) as u8,
        }
    }
}

impl Default for LoadWeights {
    fn default() -> Self {
        Self {
            queue: 35,
            speed: 35,
            thread: 15,
            rejection: 15,
        }
    }
}

/// Stateless weighted evaluator over four metric snapshots.
///
/// Queue depth saturates at 100 tasks, throughput contributes inversely
/// between 10 MB/s and 1 MB/s, worker activity is the active ratio, and
/// rejection pressure saturates at 10 recent rejections.
pub struct LoadEvaluator<C: Clock> {
    queue_depth: Arc<AtomicUsize>,
    pool: Arc<dyn PoolMetrics>,
    probe: SpeedProbe<C>,
    config: Arc<ConfigStore>,
}

impl<C: Clock> LoadEvaluator<C> {
    pub fn new(
        queue_depth: Arc<AtomicUsize>,
        pool: Arc<dyn PoolMetrics>,
        probe: SpeedProbe<C>,
        config: Arc<ConfigStore>,
    ) -> Self {
        Self {
            queue_depth,
            pool,
            probe,
            config,
        }
    }

    fn score(&self) -> LoadScore {
        let weights = LoadWeights::from_config(&self.config);

        let depth = self.queue_depth.load(Ordering::Relaxed);
        let queue = (depth.min(100) as f64 / 100.0) * f64::from(weights.queue);

        let mbps = self.probe.megabytes_per_sec();
        let speed_factor = if mbps >= 10.0 {
            0.0
        } else if mbps <= 1.0 {
            1.0
        } else {
            (10.0 - mbps) / 9.0
        };
        let speed = speed_factor * f64::from(weights.speed);

        let thread = self.pool.active_ratio().clamp(0.0, 1.0) * f64::from(weights.thread);

        let rejections = self.pool.recent_rejections();
        let rejection = (rejections.min(10) as f64 / 10.0) * f64::from(weights.rejection);

        LoadScore::new((queue + speed + thread + rejection).round() as u8)
    }
}

impl<C: Clock> LoadProbe for LoadEvaluator<C> {
    fn evaluate(&self) -> Result<LoadScore, LoadProbeError> {
        Ok(self.score())
    }
}

#[cfg(test)]
#[path = "load_tests.rs"]
mod tests;
