// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::load::LoadProbeError;
use pk_core::test_support::TaskBuilder;
use pk_core::{LoadScore, SystemClock};
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

/// Sink that records dispatch order and can be told to start rejecting.
#[derive(Default)]
struct RecordingSink {
    accepted: Mutex<Vec<CopyTask>>,
    accept_limit: AtomicUsize,
}

impl RecordingSink {
    fn unlimited() -> Arc<Self> {
        let sink = Arc::new(Self::default());
        sink.accept_limit.store(usize::MAX, Ordering::Relaxed);
        sink
    }

    fn limited(limit: usize) -> Arc<Self> {
        let sink = Arc::new(Self::default());
        sink.accept_limit.store(limit, Ordering::Relaxed);
        sink
    }

    fn sources(&self) -> Vec<String> {
        self.accepted
            .lock()
            .iter()
            .map(|t| t.source.display().to_string())
            .collect()
    }

    fn count(&self) -> usize {
        self.accepted.lock().len()
    }
}

impl TaskSink for RecordingSink {
    fn try_execute(&self, task: CopyTask) -> Result<(), CopyTask> {
        let mut accepted = self.accepted.lock();
        if accepted.len() < self.accept_limit.load(Ordering::Relaxed) {
            accepted.push(task);
            Ok(())
        } else {
            Err(task)
        }
    }
}

/// Load probe returning whatever the test scripted, including failures.
struct ScriptedLoad {
    next: Mutex<Result<LoadScore, LoadProbeError>>,
    calls: AtomicUsize,
}

impl ScriptedLoad {
    fn at(score: u8) -> Arc<Self> {
        Arc::new(Self {
            next: Mutex::new(Ok(LoadScore::new(score))),
            calls: AtomicUsize::new(0),
        })
    }

    fn set(&self, score: u8) {
        *self.next.lock() = Ok(LoadScore::new(score));
    }

    fn fail(&self, message: &str) {
        *self.next.lock() = Err(LoadProbeError(message.to_string()));
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl crate::load::LoadProbe for ScriptedLoad {
    fn evaluate(&self) -> Result<LoadScore, LoadProbeError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.next.lock().clone()
    }
}

struct Fixture {
    sink: Arc<RecordingSink>,
    load: Arc<ScriptedLoad>,
    limiter: Arc<RateLimiter<SystemClock>>,
    config: Arc<ConfigStore>,
    scheduler: Scheduler<SystemClock>,
}

fn fixture(sink: Arc<RecordingSink>, load: Arc<ScriptedLoad>) -> Fixture {
    let limiter = Arc::new(RateLimiter::new(0, 0));
    let config = Arc::new(ConfigStore::in_memory());
    let scheduler = Scheduler::new(sink.clone(), load.clone(), limiter.clone(), config.clone());
    Fixture {
        sink,
        load,
        limiter,
        config,
        scheduler,
    }
}

fn task(source: &str, priority: u8, created_ns: u64) -> CopyTask {
    TaskBuilder::new(source)
        .priority(priority)
        .created_ns(created_ns)
        .build()
}

#[test]
fn low_load_dispatches_in_priority_order() {
    let fx = fixture(RecordingSink::unlimited(), ScriptedLoad::at(0));
    fx.scheduler.submit(task("/a.tmp", 10, 1)).unwrap();
    fx.scheduler.submit(task("/b.pdf", 100, 2)).unwrap();
    fx.scheduler.submit(task("/c.xlsx", 88, 3)).unwrap();

    fx.scheduler.tick();

    assert_eq!(fx.sink.sources(), vec!["/b.pdf", "/c.xlsx", "/a.tmp"]);
    assert_eq!(fx.scheduler.pending_count(), 0);
}

#[test]
fn equal_priorities_dispatch_fifo() {
    let fx = fixture(RecordingSink::unlimited(), ScriptedLoad::at(0));
    fx.scheduler.submit(task("/late", 50, 300)).unwrap();
    fx.scheduler.submit(task("/early", 50, 100)).unwrap();
    fx.scheduler.submit(task("/mid", 50, 200)).unwrap();

    fx.scheduler.tick();

    assert_eq!(fx.sink.sources(), vec!["/early", "/mid", "/late"]);
}

#[test]
fn high_load_accumulates_and_recovers() {
    let fx = fixture(RecordingSink::unlimited(), ScriptedLoad::at(90));
    for i in 0..50 {
        fx.scheduler.submit(task(&format!("/f{i}"), 50, i)).unwrap();
    }

    fx.scheduler.tick();
    assert_eq!(fx.sink.count(), 0);
    assert!(fx.scheduler.is_accumulating());
    assert_eq!(fx.scheduler.pending_count(), 50);

    // load subsides: the very next tick drains
    fx.load.set(0);
    fx.scheduler.tick();
    assert!(!fx.scheduler.is_accumulating());
    assert!(fx.sink.count() > 0);
}

#[test]
fn medium_load_respects_batch_budget() {
    let fx = fixture(RecordingSink::unlimited(), ScriptedLoad::at(55));
    for i in 0..60 {
        fx.scheduler.submit(task(&format!("/f{i}"), 50, i)).unwrap();
    }

    fx.scheduler.tick();
    assert_eq!(fx.sink.count(), 50); // medium_batch default
    assert_eq!(fx.scheduler.pending_count(), 10);
}

#[test]
fn low_load_lets_urgent_tasks_bypass_the_budget() {
    let fx = fixture(RecordingSink::unlimited(), ScriptedLoad::at(0));
    for i in 0..40 {
        fx.scheduler.submit(task(&format!("/hot{i}"), 90, i)).unwrap();
    }
    for i in 0..40 {
        fx.scheduler
            .submit(task(&format!("/cold{i}"), 50, 100 + i))
            .unwrap();
    }

    fx.scheduler.tick();
    // all 40 urgent plus the low batch of 30
    assert_eq!(fx.sink.count(), 70);
    assert_eq!(fx.scheduler.pending_count(), 10);
}

#[test]
fn rejection_reinserts_at_the_head_and_stops_the_tick() {
    let fx = fixture(RecordingSink::limited(2), ScriptedLoad::at(0));
    fx.scheduler.submit(task("/p90", 90, 1)).unwrap();
    fx.scheduler.submit(task("/p80", 80, 2)).unwrap();
    fx.scheduler.submit(task("/p70", 70, 3)).unwrap();
    fx.scheduler.submit(task("/p60", 60, 4)).unwrap();

    fx.scheduler.tick();
    assert_eq!(fx.sink.sources(), vec!["/p90", "/p80"]);
    // nothing lost: the rejected task and the rest are still queued
    assert_eq!(fx.scheduler.pending_count(), 2);

    // executor freed up: the reinserted task leads the next tick
    fx.sink.accept_limit.store(usize::MAX, Ordering::Relaxed);
    fx.scheduler.tick();
    assert_eq!(
        fx.sink.sources(),
        vec!["/p90", "/p80", "/p70", "/p60"]
    );
    assert_eq!(fx.scheduler.pending_count(), 0);
}

#[test]
fn tick_failure_falls_back_to_fifo_order() {
    let fx = fixture(RecordingSink::unlimited(), ScriptedLoad::at(0));
    fx.scheduler.submit(task("/second.pdf", 100, 200)).unwrap();
    fx.scheduler.submit(task("/first.tmp", 10, 100)).unwrap();

    fx.load.fail("injected");
    fx.scheduler.tick();

    // creation order, not priority order
    assert_eq!(fx.sink.sources(), vec!["/first.tmp", "/second.pdf"]);
    assert!(fx.scheduler.is_degraded());

    // failure source removed: priority ordering resumes
    fx.load.set(0);
    fx.scheduler.submit(task("/b.tmp", 10, 400)).unwrap();
    fx.scheduler.submit(task("/a.pdf", 100, 500)).unwrap();
    fx.scheduler.tick();
    assert!(!fx.scheduler.is_degraded());
    assert_eq!(
        fx.sink.sources(),
        vec!["/first.tmp", "/second.pdf", "/a.pdf", "/b.tmp"]
    );
}

#[test]
fn repeated_failures_back_off_the_normal_path() {
    let fx = fixture(RecordingSink::unlimited(), ScriptedLoad::at(0));
    fx.load.fail("down");

    fx.scheduler.tick(); // streak 1
    fx.scheduler.tick(); // streak 2 -> backoff engaged
    let calls_after_failures = fx.load.calls();

    // backed-off ticks stay in fallback without consulting the probe
    fx.scheduler.tick();
    assert_eq!(fx.load.calls(), calls_after_failures);
    assert!(fx.scheduler.is_degraded());

    // once the backoff expires the probe is consulted again
    fx.load.set(0);
    fx.scheduler.tick();
    assert!(fx.load.calls() > calls_after_failures);
    assert!(!fx.scheduler.is_degraded());
}

#[test]
fn rate_ceiling_only_moves_down() {
    let fx = fixture(RecordingSink::unlimited(), ScriptedLoad::at(55));
    fx.config
        .set(&pk_core::schema::COPY_RATE_LIMIT_BASE, 100_000_000)
        .unwrap();

    fx.scheduler.tick();
    assert_eq!(fx.limiter.current_rate(), 70_000_000); // medium 70%

    // back to LOW: no re-raise within the session
    fx.load.set(0);
    fx.scheduler.tick();
    assert_eq!(fx.limiter.current_rate(), 70_000_000);

    fx.load.set(90);
    fx.scheduler.tick();
    assert_eq!(fx.limiter.current_rate(), 40_000_000); // high 40%

    fx.load.set(0);
    fx.scheduler.tick();
    assert_eq!(fx.limiter.current_rate(), 40_000_000);
}

#[test]
fn rate_adjustment_skipped_without_base_or_auto_mode() {
    let fx = fixture(RecordingSink::unlimited(), ScriptedLoad::at(90));
    fx.scheduler.tick();
    assert_eq!(fx.limiter.current_rate(), 0); // base unset: untouched

    fx.config
        .set(&pk_core::schema::COPY_RATE_LIMIT_BASE, 1_000_000)
        .unwrap();
    fx.config
        .set(&pk_core::schema::AUTO_MODE_ENABLED, false)
        .unwrap();
    fx.scheduler.tick();
    assert_eq!(fx.limiter.current_rate(), 0);
}

#[test]
fn cancelled_tasks_are_skipped_silently() {
    let fx = fixture(RecordingSink::unlimited(), ScriptedLoad::at(0));
    let cancelled = task("/gone", 90, 1);
    cancelled.cancel.cancel();
    fx.scheduler.submit(cancelled).unwrap();
    fx.scheduler.submit(task("/kept", 50, 2)).unwrap();

    fx.scheduler.tick();
    assert_eq!(fx.sink.sources(), vec!["/kept"]);
}

#[tokio::test]
async fn shutdown_drains_then_cancels_leftovers() {
    let fx = fixture(RecordingSink::limited(1), ScriptedLoad::at(0));
    fx.scheduler.submit(task("/a", 90, 1)).unwrap();
    fx.scheduler.submit(task("/b", 80, 2)).unwrap();
    fx.scheduler.submit(task("/c", 70, 3)).unwrap();

    let leftovers = fx.scheduler.shutdown().await;
    assert_eq!(fx.sink.count(), 1);
    assert_eq!(leftovers.len(), 2);
    assert!(leftovers.iter().all(|t| t.is_cancelled()));

    // no new work after shutdown
    assert!(fx.scheduler.submit(task("/late", 50, 9)).is_err());
}

#[tokio::test]
async fn dispatcher_loop_ticks_on_its_own() {
    let sink = RecordingSink::unlimited();
    let load = ScriptedLoad::at(0);
    let fx = fixture(sink.clone(), load);
    fx.config.set(&pk_core::schema::INITIAL_DELAY_MS, 5).unwrap();
    fx.config.set(&pk_core::schema::TICK_INTERVAL_MS, 10).unwrap();

    fx.scheduler.submit(task("/auto", 50, 1)).unwrap();
    fx.scheduler.start();

    for _ in 0..200 {
        if sink.count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(sink.count(), 1);
    fx.scheduler.shutdown().await;
}
