// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device lifecycle tracking: discovery, ghost reconciliation, blacklist,
//! and the periodic scan service

use crate::volumes::{VolumeProvider, VolumeSnapshot};
use async_trait::async_trait;
use parking_lot::Mutex;
use pk_core::{
    schema, Clock, ConfigStore, Device, DeviceError, DeviceState, Event, Serial, SystemClock,
};
use pk_engine::{EventBus, Service, ServiceError};
use pk_storage::{KnownSerials, SerialStore};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The device mutations the scanner is allowed to request, keyed by serial
/// so the scanner never owns a device.
pub trait DeviceControl: Send + Sync {
    /// Idle -> Scanning; false when the device is not scannable.
    fn begin_scan(&self, serial: &Serial) -> bool;
    /// Scanning -> Idle, if still scanning.
    fn end_scan(&self, serial: &Serial);
    /// Flag a device whose traversal keeps failing.
    fn mark_unavailable(&self, serial: &Serial);
    /// Unavailable -> Idle, once the backoff elapsed.
    fn recover(&self, serial: &Serial);
    /// Current mount point, while online.
    fn mount_of(&self, serial: &Serial) -> Option<PathBuf>;
}

struct ManagerState {
    devices: HashMap<Serial, Device>,
    known: KnownSerials,
}

/// Owns the live device set. All mutations happen behind one lock; events
/// broadcast after the lock is released.
pub struct DeviceManager<P: VolumeProvider, C: Clock = SystemClock> {
    provider: P,
    config: Arc<ConfigStore>,
    bus: EventBus<C>,
    store: SerialStore,
    state: Mutex<ManagerState>,
}

impl<P: VolumeProvider, C: Clock> DeviceManager<P, C> {
    /// Load the persisted serial set and materialize each entry as a ghost.
    pub fn new(
        provider: P,
        config: Arc<ConfigStore>,
        bus: EventBus<C>,
        store: SerialStore,
    ) -> io::Result<Self> {
        let known = store.load()?;
        let devices = known
            .iter()
            .map(|serial| (serial.clone(), Device::ghost(serial.clone())))
            .collect();
        Ok(Self {
            provider,
            config,
            bus,
            store,
            state: Mutex::new(ManagerState { devices, known }),
        })
    }

    /// Immutable snapshot of every tracked device.
    pub fn devices(&self) -> Vec<Device> {
        let state = self.state.lock();
        let mut devices: Vec<_> = state.devices.values().cloned().collect();
        devices.sort_by(|a, b| a.serial().cmp(b.serial()));
        devices
    }

    pub fn device(&self, serial: &Serial) -> Option<Device> {
        self.state.lock().devices.get(serial).cloned()
    }

    /// One reconciliation pass against the currently mounted volumes.
    pub async fn discover(&self) -> io::Result<()> {
        let volumes = self.provider.list().await?;
        let blacklist = self.config.get(&schema::DEVICE_BLACKLIST);

        let seen: HashMap<Serial, VolumeSnapshot> = volumes
            .into_iter()
            .filter(|v| !blacklist.iter().any(|b| b == v.serial.as_str()))
            .map(|v| (v.serial.clone(), v))
            .collect();

        let mut events = Vec::new();
        {
            let mut state = self.state.lock();
            let mut known_changed = false;

            for (serial, snapshot) in &seen {
                if !state.devices.contains_key(serial) {
                    let brand_new = state.known.insert(serial.clone());
                    known_changed |= brand_new;
                    let device = Device::mounted(
                        serial.clone(),
                        snapshot.mount.clone(),
                        snapshot.info.clone(),
                        snapshot.system_disk,
                    );
                    state.devices.insert(serial.clone(), device);
                    if brand_new {
                        events.push(Event::NewDeviceJoined {
                            serial: serial.clone(),
                            label: snapshot.info.label.clone(),
                        });
                    }
                    events.push(Event::DeviceInserted {
                        serial: serial.clone(),
                        mount: snapshot.mount.clone(),
                    });
                    continue;
                }
                let Some(device) = state.devices.get_mut(serial) else {
                    continue;
                };
                if device.state() == DeviceState::Offline {
                    device.set_system_disk(snapshot.system_disk);
                    match device.attach(snapshot.mount.clone(), snapshot.info.clone()) {
                        Ok(old) => {
                            events.push(Event::DeviceStateChanged {
                                serial: serial.clone(),
                                old,
                                new: device.state(),
                            });
                            events.push(Event::DeviceInserted {
                                serial: serial.clone(),
                                mount: snapshot.mount.clone(),
                            });
                        }
                        Err(err) => warn!(serial = %serial, error = %err, "attach refused"),
                    }
                } else {
                    device.update_volume(snapshot.info.clone());
                }
            }

            // known serials absent from this scan become ghosts
            let absent: Vec<Serial> = state
                .known
                .iter()
                .filter(|serial| !seen.contains_key(*serial))
                .cloned()
                .collect();
            for serial in absent {
                let Some(device) = state.devices.get_mut(&serial) else {
                    continue;
                };
                if device.state() == DeviceState::Offline {
                    continue;
                }
                match device.transition(DeviceState::Offline) {
                    Ok(old) => {
                        events.push(Event::DeviceStateChanged {
                            serial: serial.clone(),
                            old,
                            new: DeviceState::Offline,
                        });
                        events.push(Event::DeviceRemoved {
                            serial: serial.clone(),
                        });
                    }
                    Err(err) => warn!(serial = %serial, error = %err, "offline refused"),
                }
            }

            if known_changed {
                if let Err(err) = self.store.save(&state.known) {
                    error!(error = %err, "known-serials save failed");
                }
            }
        }

        for event in events {
            self.bus.publish(event);
        }
        Ok(())
    }

    /// Re-enable a disabled device.
    pub fn enable(&self, serial: &Serial) -> Result<(), DeviceError> {
        self.transition(serial, DeviceState::Idle)
    }

    pub fn disable(&self, serial: &Serial) -> Result<(), DeviceError> {
        self.transition(serial, DeviceState::Disabled)
    }

    pub fn pause(&self, serial: &Serial) -> Result<(), DeviceError> {
        self.transition(serial, DeviceState::Paused)
    }

    pub fn resume(&self, serial: &Serial) -> Result<(), DeviceError> {
        self.transition(serial, DeviceState::Idle)
    }

    /// Forget a serial entirely: persisted set, live map, and ghost.
    pub fn remove_completely(&self, serial: &Serial) -> io::Result<()> {
        let removed = {
            let mut state = self.state.lock();
            let was_known = state.known.remove(serial);
            if was_known {
                self.store.save(&state.known)?;
            }
            state.devices.remove(serial)
        };
        if removed.is_some() {
            self.bus.publish(Event::DeviceRemoved {
                serial: serial.clone(),
            });
            info!(serial = %serial, "device forgotten");
        }
        Ok(())
    }

    fn transition(&self, serial: &Serial, next: DeviceState) -> Result<(), DeviceError> {
        let event = {
            let mut state = self.state.lock();
            let device = state
                .devices
                .get_mut(serial)
                .ok_or_else(|| DeviceError::Offline(serial.clone()))?;
            let old = device.transition(next)?;
            Event::DeviceStateChanged {
                serial: serial.clone(),
                old,
                new: next,
            }
        };
        self.bus.publish(event);
        Ok(())
    }
}

impl<P: VolumeProvider, C: Clock> DeviceControl for DeviceManager<P, C> {
    fn begin_scan(&self, serial: &Serial) -> bool {
        self.transition(serial, DeviceState::Scanning).is_ok()
    }

    fn end_scan(&self, serial: &Serial) {
        let scanning = self
            .device(serial)
            .is_some_and(|d| d.state() == DeviceState::Scanning);
        if scanning {
            let _ = self.transition(serial, DeviceState::Idle);
        }
    }

    fn mark_unavailable(&self, serial: &Serial) {
        if let Err(err) = self.transition(serial, DeviceState::Unavailable) {
            warn!(serial = %serial, error = %err, "unavailable transition refused");
        }
    }

    fn recover(&self, serial: &Serial) {
        let unavailable = self
            .device(serial)
            .is_some_and(|d| d.state() == DeviceState::Unavailable);
        if unavailable {
            let _ = self.transition(serial, DeviceState::Idle);
        }
    }

    fn mount_of(&self, serial: &Serial) -> Option<PathBuf> {
        self.device(serial)
            .and_then(|d| d.mount().map(|m| m.to_path_buf()))
    }
}

/// Periodic discovery loop, registered as the last service to start.
pub struct DiscoveryService<P: VolumeProvider, C: Clock> {
    manager: Arc<DeviceManager<P, C>>,
    config: Arc<ConfigStore>,
    cancel: Mutex<CancellationToken>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<P: VolumeProvider + 'static, C: Clock> DiscoveryService<P, C> {
    pub fn new(manager: Arc<DeviceManager<P, C>>, config: Arc<ConfigStore>) -> Self {
        Self {
            manager,
            config,
            cancel: Mutex::new(CancellationToken::new()),
            handle: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<P: VolumeProvider + 'static, C: Clock> Service for DiscoveryService<P, C> {
    fn name(&self) -> &'static str {
        "device-discovery"
    }

    async fn start(&self) -> Result<(), ServiceError> {
        let manager = self.manager.clone();
        let config = self.config.clone();
        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();
        let handle = tokio::spawn(async move {
            let initial =
                Duration::from_secs(config.get(&schema::INITIAL_DELAY_SEC).max(0) as u64);
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(initial) => {}
            }
            loop {
                if let Err(err) = manager.discover().await {
                    error!(error = %err, "device discovery failed");
                }
                let interval =
                    Duration::from_secs(config.get(&schema::SCAN_INTERVAL_SEC).max(1) as u64);
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
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
