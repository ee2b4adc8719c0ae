// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-global copy speed probe

use parking_lot::Mutex;
use pk_core::{Clock, SystemClock};
use std::sync::Arc;
use std::time::Instant;

const WINDOW_SECS: usize = 4;

struct Window {
    started: Instant,
    /// Per-second byte buckets keyed by seconds since `started`.
    buckets: [u64; WINDOW_SECS],
    stamps: [u64; WINDOW_SECS],
}

/// Aggregates bytes/sec across all live copies over a short sliding window.
///
/// Cloning shares the window; every copy worker records into the same probe.
pub struct SpeedProbe<C: Clock = SystemClock> {
    window: Arc<Mutex<Window>>,
    clock: C,
}

impl<C: Clock> Clone for SpeedProbe<C> {
    fn clone(&self) -> Self {
        Self {
            window: self.window.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl SpeedProbe<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for SpeedProbe<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> SpeedProbe<C> {
    pub fn with_clock(clock: C) -> Self {
        let started = clock.now();
        Self {
            window: Arc::new(Mutex::new(Window {
                started,
                buckets: [0; WINDOW_SECS],
                stamps: [0; WINDOW_SECS],
            })),
            clock,
        }
    }

    fn second(&self, window: &Window) -> u64 {
        self.clock
            .now()
            .saturating_duration_since(window.started)
            .as_secs()
    }

    /// Record bytes moved by a copy worker.
    pub fn record(&self, bytes: u64) {
        let mut window = self.window.lock();
        let second = self.second(&window);
        let idx = (second as usize) % WINDOW_SECS;
        if window.stamps[idx] != second {
            window.stamps[idx] = second;
            window.buckets[idx] = 0;
        }
        window.buckets[idx] += bytes;
    }

    /// Aggregate throughput over the sliding window, in bytes/sec.
    pub fn bytes_per_sec(&self) -> f64 {
        let window = self.window.lock();
        let second = self.second(&window);
        let oldest = second.saturating_sub(WINDOW_SECS as u64 - 1);
        let total: u64 = (0..WINDOW_SECS)
            .filter(|&i| window.stamps[i] >= oldest && window.stamps[i] <= second)
            .map(|i| window.buckets[i])
            .sum();
        let span = (second - oldest + 1).min(WINDOW_SECS as u64);
        total as f64 / span as f64
    }

    /// Throughput in decimal megabytes per second, the evaluator's unit.
    pub fn megabytes_per_sec(&self) -> f64 {
        self.bytes_per_sec() / 1_000_000.0
    }
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;
