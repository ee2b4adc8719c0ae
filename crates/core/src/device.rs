// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device identity, volume descriptor, and state machine

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::borrow::Borrow;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Vendor-reported serial number; the stable identity of a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Serial(SmolStr);

impl Serial {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(SmolStr::new(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Serial {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Serial {
    fn from(s: String) -> Self {
        Self(SmolStr::new(&s))
    }
}

impl Borrow<str> for Serial {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Device lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    /// Known but not currently mounted (ghost).
    Offline,
    /// Mounted but failing I/O; the scanner backs off.
    Unavailable,
    /// Mounted and ready.
    Idle,
    /// Initial traversal in progress.
    Scanning,
    /// Suspended by the user; resumable.
    Paused,
    /// Excluded by the user; requires an explicit enable.
    Disabled,
}

impl DeviceState {
    pub fn is_online(self) -> bool {
        self != DeviceState::Offline
    }

    /// Whether a scanner may run (or keep running) in this state.
    pub fn scannable(self) -> bool {
        matches!(self, DeviceState::Idle | DeviceState::Scanning)
    }

    pub fn can_transition_to(self, next: DeviceState) -> bool {
        use DeviceState::*;
        if self == next {
            return false;
        }
        match next {
            Offline => true,
            Idle => matches!(self, Offline | Scanning | Paused | Disabled | Unavailable),
            Scanning => self == Idle,
            Paused => matches!(self, Idle | Scanning),
            Disabled => true,
            Unavailable => matches!(self, Idle | Scanning),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceState::Offline => "offline",
            DeviceState::Unavailable => "unavailable",
            DeviceState::Idle => "idle",
            DeviceState::Scanning => "scanning",
            DeviceState::Paused => "paused",
            DeviceState::Disabled => "disabled",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Volume descriptor reported at mount time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub label: String,
    pub fs_type: String,
    pub total_bytes: u64,
    pub usable_bytes: u64,
}

/// Errors from device state manipulation
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device {serial}: invalid transition {from} -> {to}")]
    InvalidTransition {
        serial: Serial,
        from: DeviceState,
        to: DeviceState,
    },
    #[error("device {0} is a system disk and cannot be enabled")]
    SystemDisk(Serial),
    #[error("device {0} is offline")]
    Offline(Serial),
}

/// A tracked removable device.
///
/// Identity never changes after construction; the mount point is present
/// exactly while the device is online. Only the device manager mutates
/// state, everything else refers to devices by [`Serial`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    serial: Serial,
    state: DeviceState,
    mount: Option<PathBuf>,
    volume: Option<VolumeInfo>,
    system_disk: bool,
}

impl Device {
    /// A known-but-unmounted device restored from the serial store.
    pub fn ghost(serial: Serial) -> Self {
        Self {
            serial,
            state: DeviceState::Offline,
            mount: None,
            volume: None,
            system_disk: false,
        }
    }

    /// A freshly discovered mounted device.
    ///
    /// System disks come up `Disabled`; they are tracked for display but are
    /// never eligible for scanning.
    pub fn mounted(serial: Serial, mount: PathBuf, volume: VolumeInfo, system_disk: bool) -> Self {
        Self {
            serial,
            state: if system_disk {
                DeviceState::Disabled
            } else {
                DeviceState::Idle
            },
            mount: Some(mount),
            volume: Some(volume),
            system_disk,
        }
    }

    pub fn serial(&self) -> &Serial {
        &self.serial
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn mount(&self) -> Option<&Path> {
        self.mount.as_deref()
    }

    /// Last-known volume descriptor; retained while offline.
    pub fn volume(&self) -> Option<&VolumeInfo> {
        self.volume.as_ref()
    }

    pub fn is_system_disk(&self) -> bool {
        self.system_disk
    }

    /// Apply a state transition, returning the previous state.
    ///
    /// Going offline clears the mount point; a system disk refuses every
    /// transition toward an enabled state.
    pub fn transition(&mut self, next: DeviceState) -> Result<DeviceState, DeviceError> {
        if self.system_disk && matches!(next, DeviceState::Idle | DeviceState::Scanning) {
            return Err(DeviceError::SystemDisk(self.serial.clone()));
        }
        if next.is_online() && self.mount.is_none() {
            return Err(DeviceError::Offline(self.serial.clone()));
        }
        if !self.state.can_transition_to(next) {
            return Err(DeviceError::InvalidTransition {
                serial: self.serial.clone(),
                from: self.state,
                to: next,
            });
        }
        let old = self.state;
        self.state = next;
        if next == DeviceState::Offline {
            self.mount = None;
        }
        Ok(old)
    }

    /// Bring a ghost online at the given mount point.
    pub fn attach(
        &mut self,
        mount: PathBuf,
        volume: VolumeInfo,
    ) -> Result<DeviceState, DeviceError> {
        let target = if self.system_disk {
            DeviceState::Disabled
        } else {
            DeviceState::Idle
        };
        // mount first: online states require one
        let previous_mount = self.mount.replace(mount);
        match self.transition(target) {
            Ok(old) => {
                self.volume = Some(volume);
                Ok(old)
            }
            Err(err) => {
                self.mount = previous_mount;
                Err(err)
            }
        }
    }

    /// Refresh mount metadata without a state change.
    pub fn update_volume(&mut self, volume: VolumeInfo) {
        self.volume = Some(volume);
    }

    /// Mark rediscovered hardware as a system disk.
    pub fn set_system_disk(&mut self, system_disk: bool) {
        self.system_disk = system_disk;
    }
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
