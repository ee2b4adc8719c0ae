// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-device scanning: initial traversal, incremental watch, retry

mod walk;
mod watch;

pub use watch::WatchBatch;

use crate::filter::FileFilter;
use crate::manager::DeviceControl;
use parking_lot::Mutex;
use pk_core::{schema, Clock, ConfigStore, CopyOutcome, CopyTask, Event, Serial, SystemClock};
use pk_engine::{EventBus, Scheduler, Service, ServiceError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where discovered files go; false when the receiver is shutting down.
pub trait TaskSubmitter: Send + Sync {
    fn submit_task(&self, task: CopyTask) -> bool;
}

impl<C: Clock> TaskSubmitter for Scheduler<C> {
    fn submit_task(&self, task: CopyTask) -> bool {
        self.submit(task).is_ok()
    }
}

struct SupervisorInner<C: Clock> {
    control: Arc<dyn DeviceControl>,
    submitter: Arc<dyn TaskSubmitter>,
    config: Arc<ConfigStore>,
    bus: EventBus<C>,
    clock: C,
    active: Mutex<HashMap<Serial, ScannerHandle>>,
    /// Consecutive enumeration failures per device, for the device-level
    /// backoff.
    failures: Mutex<HashMap<Serial, u32>>,
    /// Outlives individual scanners; backoff timers hang off this so an
    /// UNAVAILABLE device still recovers after its scanner stopped.
    shutdown: CancellationToken,
}

struct ScannerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Runs exactly one scanner per scannable device, driven by bus events.
pub struct ScannerSupervisor<C: Clock = SystemClock> {
    inner: Arc<SupervisorInner<C>>,
}

impl<C: Clock> Clone for ScannerSupervisor<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Clock> ScannerSupervisor<C> {
    pub fn new(
        control: Arc<dyn DeviceControl>,
        submitter: Arc<dyn TaskSubmitter>,
        config: Arc<ConfigStore>,
        bus: EventBus<C>,
        clock: C,
    ) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                control,
                submitter,
                config,
                bus,
                clock,
                active: Mutex::new(HashMap::new()),
                failures: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Wire the supervisor to device lifecycle events.
    pub fn attach(&self) -> pk_engine::Subscription {
        let this = self.clone();
        self.inner.bus.subscribe(
            "scanner-supervisor",
            pk_engine::EventFilter::All,
            move |delivery| {
                this.handle_event(&delivery.event);
                Ok(None)
            },
        )
    }

    /// React to one device event; also the unit tests' entry point.
    pub fn handle_event(&self, event: &Event) {
        use pk_core::DeviceState::*;
        match event {
            Event::DeviceInserted { serial, .. } => self.start_scanner(serial),
            Event::DeviceStateChanged {
                serial,
                old,
                new: Idle,
            } => {
                // Scanning -> Idle means phase 1 just finished in the same
                // scanner task; everything else is a fresh go-ahead.
                if *old != Scanning {
                    self.start_scanner(serial);
                }
            }
            Event::DeviceStateChanged { serial, new, .. } if !new.scannable() => {
                self.stop_scanner(serial);
            }
            Event::DeviceRemoved { serial } => self.stop_scanner(serial),
            _ => {}
        }
    }

    fn start_scanner(&self, serial: &Serial) {
        let mut active = self.inner.active.lock();
        if let Some(handle) = active.get(serial) {
            if !handle.task.is_finished() {
                return;
            }
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_device(
            self.inner.clone(),
            serial.clone(),
            cancel.clone(),
        ));
        active.insert(serial.clone(), ScannerHandle { cancel, task });
        debug!(serial = %serial, "scanner started");
    }

    fn stop_scanner(&self, serial: &Serial) {
        if let Some(handle) = self.inner.active.lock().remove(serial) {
            handle.cancel.cancel();
            debug!(serial = %serial, "scanner stopped");
        }
    }

    /// Cancel every scanner and backoff timer, waiting for the tasks to
    /// unwind.
    pub async fn stop_all(&self) {
        self.inner.shutdown.cancel();
        let handles: Vec<ScannerHandle> = {
            let mut active = self.inner.active.lock();
            active.drain().map(|(_, handle)| handle).collect()
        };
        for handle in &handles {
            handle.cancel.cancel();
        }
        for handle in handles {
            let _ = handle.task.await;
        }
    }

    pub fn active_count(&self) -> usize {
        self.inner.active.lock().len()
    }
}

/// The per-device scanner: phase 1 walk, retries, then the watch loop.
async fn run_device<C: Clock>(
    inner: Arc<SupervisorInner<C>>,
    serial: Serial,
    cancel: CancellationToken,
) {
    let Some(mount) = inner.control.mount_of(&serial) else {
        return;
    };
    if !inner.control.begin_scan(&serial) {
        return;
    }
    let filter = FileFilter::from_config(&inner.config);
    let outcome = walk::walk_blocking(
        mount.clone(),
        serial.clone(),
        filter.clone(),
        inner.clock.clone(),
        inner.submitter.clone(),
        cancel.clone(),
    )
    .await;
    inner.control.end_scan(&serial);

    match outcome {
        Err(error) => {
            warn!(serial = %serial, error = %error, "enumeration failed");
            let backoff_cancel = inner.shutdown.child_token();
            tokio::spawn(device_backoff(inner, serial, backoff_cancel));
            return;
        }
        Ok(report) => {
            inner.failures.lock().remove(&serial);
            info!(
                serial = %serial,
                submitted = report.submitted,
                retries = report.failed.len(),
                "initial walk complete"
            );
            if !report.failed.is_empty() {
                tokio::spawn(retry_paths(
                    inner.clone(),
                    serial.clone(),
                    mount.clone(),
                    report.failed,
                    cancel.clone(),
                ));
            }
        }
    }

    if inner.config.get(&schema::WATCH_ENABLED) {
        watch::watch_mount(inner, serial, mount, cancel).await;
    }
}

/// Device-level backoff: flag UNAVAILABLE, wait, then hand the device back
/// so discovery-driven retry can kick in.
async fn device_backoff<C: Clock>(
    inner: Arc<SupervisorInner<C>>,
    serial: Serial,
    cancel: CancellationToken,
) {
    inner.control.mark_unavailable(&serial);
    let streak = {
        let mut failures = inner.failures.lock();
        let streak = failures.entry(serial.clone()).or_insert(0);
        *streak += 1;
        *streak
    };
    let base = inner.config.get(&schema::SCAN_INTERVAL_SEC).max(1) as u64;
    let delay = Duration::from_secs(base << streak.min(5));
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(delay) => {}
    }
    inner.control.recover(&serial);
}

/// Transient per-path failures: exponential backoff up to `retry_count`,
/// then a terminal FAIL completion.
async fn retry_paths<C: Clock>(
    inner: Arc<SupervisorInner<C>>,
    serial: Serial,
    mount: PathBuf,
    paths: Vec<PathBuf>,
    cancel: CancellationToken,
) {
    let attempts = inner.config.get(&schema::RETRY_COUNT).max(1) as u32;
    let filter = FileFilter::from_config(&inner.config);
    for path in paths {
        let mut delivered = false;
        for attempt in 0..attempts {
            let delay = Duration::from_millis(500u64 << attempt.min(6));
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if let Some(task) = walk::task_for_path(
                &mount,
                &serial,
                &path,
                &filter,
                &inner.clock,
                &cancel,
            ) {
                if inner.submitter.submit_task(task) {
                    delivered = true;
                    break;
                }
            }
        }
        if !delivered {
            inner.bus.publish(Event::CopyCompleted {
                source: path,
                destination: None,
                file_size: 0,
                bytes_copied: 0,
                result: CopyOutcome::Fail,
                at_ms: inner.clock.epoch_ms(),
            });
        }
    }
}

/// Service wrapper: the supervisor starts with the app and tears its
/// scanners down on shutdown.
pub struct ScannerService<C: Clock> {
    supervisor: ScannerSupervisor<C>,
    subscription: Mutex<Option<pk_engine::Subscription>>,
}

impl<C: Clock> ScannerService<C> {
    pub fn new(supervisor: ScannerSupervisor<C>) -> Self {
        Self {
            supervisor,
            subscription: Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl<C: Clock> Service for ScannerService<C> {
    fn name(&self) -> &'static str {
        "scanner-supervisor"
    }

    async fn start(&self) -> Result<(), ServiceError> {
        let mut subscription = self.subscription.lock();
        if subscription.is_none() {
            *subscription = Some(self.supervisor.attach());
        }
        Ok(())
    }

    async fn stop(&self) {
        let subscription = self.subscription.lock().take();
        if let Some(subscription) = subscription {
            self.supervisor.inner.bus.unsubscribe(subscription).await;
        }
        self.supervisor.stop_all().await;
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
