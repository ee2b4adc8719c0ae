// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Load-aware token-bucket rate limiter

use parking_lot::Mutex;
use pk_core::{Clock, SystemClock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Error from a cancelled acquisition; no tokens are consumed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AcquireError {
    #[error("rate limiter wait cancelled")]
    Cancelled,
}

struct Bucket {
    /// Bytes per second; 0 means unbounded.
    rate: u64,
    burst: u64,
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        if self.rate > 0 {
            let elapsed = now.saturating_duration_since(self.last_refill);
            let replenished = elapsed.as_secs_f64() * self.rate as f64;
            self.tokens = (self.tokens + replenished).min(self.effective_burst() as f64);
        }
        self.last_refill = now;
    }

    /// A zero burst with a live rate would starve every waiter; treat it as
    /// one second's worth of tokens.
    fn effective_burst(&self) -> u64 {
        if self.burst == 0 {
            self.rate
        } else {
            self.burst
        }
    }
}

/// Token bucket with runtime-adjustable rate and burst.
///
/// Refill is lazy: tokens are credited from the elapsed time at each
/// observation, so an in-flight wait sees a limit change at its next refill
/// computation.
pub struct RateLimiter<C: Clock = SystemClock> {
    bucket: Mutex<Bucket>,
    limit_changed: Notify,
    clock: C,
}

impl RateLimiter<SystemClock> {
    pub fn new(rate: u64, burst: u64) -> Self {
        Self::with_clock(rate, burst, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(rate: u64, burst: u64, clock: C) -> Self {
        let now = clock.now();
        let initial = if burst == 0 { rate } else { burst };
        Self {
            bucket: Mutex::new(Bucket {
                rate,
                burst,
                tokens: initial as f64,
                last_refill: now,
            }),
            limit_changed: Notify::new(),
            clock,
        }
    }

    pub fn current_rate(&self) -> u64 {
        self.bucket.lock().rate
    }

    pub fn current_burst(&self) -> u64 {
        self.bucket.lock().burst
    }

    /// Replace rate and burst. Tokens already accrued are kept, capped at
    /// the new burst; blocked waiters recompute immediately.
    pub fn set_limit(&self, rate: u64, burst: u64) {
        {
            let mut bucket = self.bucket.lock();
            bucket.refill(self.clock.now());
            bucket.rate = rate;
            bucket.burst = burst;
            bucket.tokens = bucket.tokens.min(bucket.effective_burst() as f64);
        }
        self.limit_changed.notify_waiters();
    }

    /// Take `n` tokens without waiting; `false` leaves the bucket unchanged.
    pub fn try_acquire(&self, n: u64) -> bool {
        let mut bucket = self.bucket.lock();
        bucket.refill(self.clock.now());
        if bucket.rate == 0 {
            return true;
        }
        let need = (n.min(bucket.effective_burst())) as f64;
        if bucket.tokens >= need {
            bucket.tokens -= need;
            true
        } else {
            false
        }
    }

    /// Block cooperatively until `n` tokens are available, then take them.
    ///
    /// Requests above the burst are clamped to the burst so they can ever be
    /// satisfied. Cancellation while waiting consumes nothing.
    pub async fn acquire(&self, n: u64, cancel: &CancellationToken) -> Result<(), AcquireError> {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock();
                bucket.refill(self.clock.now());
                if bucket.rate == 0 {
                    return Ok(());
                }
                let need = (n.min(bucket.effective_burst())) as f64;
                if bucket.tokens >= need {
                    bucket.tokens -= need;
                    return Ok(());
                }
                let deficit = need - bucket.tokens;
                Duration::from_secs_f64(deficit / bucket.rate as f64)
            };
            tokio::select! {
                _ = cancel.cancelled() => return Err(AcquireError::Cancelled),
                _ = self.limit_changed.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

#[cfg(test)]
#[path = "limiter_tests.rs"]
mod tests;
