// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Volume enumeration: the provider trait and the Linux implementation

use async_trait::async_trait;
use pk_core::{Serial, VolumeInfo};
use std::io;
use std::path::{Path, PathBuf};

/// One currently mounted volume as the host reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeSnapshot {
    pub serial: Serial,
    pub mount: PathBuf,
    pub info: VolumeInfo,
    pub system_disk: bool,
}

/// Source of mounted-volume snapshots.
#[async_trait]
pub trait VolumeProvider: Send + Sync {
    async fn list(&self) -> io::Result<Vec<VolumeSnapshot>>;
}

/// A parsed `/proc/mounts` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MountLine {
    pub device: String,
    pub mount_point: PathBuf,
    pub fs_type: String,
}

/// Filesystems that never correspond to attached storage.
const PSEUDO_FS: &[&str] = &[
    "proc", "sysfs", "devtmpfs", "devpts", "tmpfs", "cgroup", "cgroup2", "overlay", "squashfs",
    "debugfs", "tracefs", "securityfs", "pstore", "bpf", "autofs", "mqueue", "hugetlbfs",
    "fusectl", "configfs", "ramfs", "binfmt_misc", "nsfs", "rpc_pipefs",
];

/// Keep block-device mounts only; octal escapes in mount points are decoded.
pub(crate) fn parse_mounts(text: &str) -> Vec<MountLine> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let mount_point = fields.next()?;
            let fs_type = fields.next()?;
            if !device.starts_with("/dev/") || PSEUDO_FS.contains(&fs_type) {
                return None;
            }
            Some(MountLine {
                device: device.to_string(),
                mount_point: PathBuf::from(unescape_mount(mount_point)),
                fs_type: fs_type.to_string(),
            })
        })
        .collect()
}

/// `/proc/mounts` escapes spaces and friends as `\040` octal sequences.
fn unescape_mount(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let octal = &raw[i + 1..i + 4];
            if let Ok(value) = u8::from_str_radix(octal, 8) {
                out.push(value as char);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

/// Enumerates mounted block devices via `/proc/mounts` and sysfs serial
/// hints.
#[derive(Debug, Clone, Default)]
pub struct LinuxVolumes;

impl LinuxVolumes {
    fn serial_for(device: &str) -> Serial {
        let name = device.trim_start_matches("/dev/");
        // strip a partition suffix: sdb1 -> sdb, nvme0n1p2 -> nvme0n1
        let base = base_block_device(name);
        for candidate in [
            format!("/sys/class/block/{base}/serial"),
            format!("/sys/class/block/{base}/device/serial"),
        ] {
            if let Ok(serial) = std::fs::read_to_string(&candidate) {
                let serial = serial.trim();
                if !serial.is_empty() {
                    return Serial::new(serial);
                }
            }
        }
        // stable fallback: the device node name itself
        Serial::new(name)
    }

    fn snapshot(line: &MountLine) -> VolumeSnapshot {
        let total_bytes = fs2::total_space(&line.mount_point).unwrap_or(0);
        let usable_bytes = fs2::available_space(&line.mount_point).unwrap_or(0);
        let label = line
            .mount_point
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("root")
            .to_string();
        VolumeSnapshot {
            serial: Self::serial_for(&line.device),
            mount: line.mount_point.clone(),
            info: VolumeInfo {
                label,
                fs_type: line.fs_type.clone(),
                total_bytes,
                usable_bytes,
            },
            system_disk: line.mount_point == Path::new("/"),
        }
    }
}

/// `sdb1` -> `sdb`, `nvme0n1p2` -> `nvme0n1`, `mmcblk0p1` -> `mmcblk0`.
pub(crate) fn base_block_device(name: &str) -> String {
    if let Some((prefix, suffix)) = name.rsplit_once('p') {
        if prefix.ends_with(|c: char| c.is_ascii_digit())
            && !suffix.is_empty()
            && suffix.chars().all(|c| c.is_ascii_digit())
        {
            return prefix.to_string();
        }
    }
    if name.ends_with(|c: char| c.is_ascii_digit()) {
        let trimmed = name.trim_end_matches(|c: char| c.is_ascii_digit());
        // sdb1 trims to sdb, but nvme0n1 keeps its namespace digits
        if trimmed.ends_with(|c: char| c.is_ascii_alphabetic())
            && !trimmed.contains(|c: char| c.is_ascii_digit())
        {
            return trimmed.to_string();
        }
    }
    name.to_string()
}

#[async_trait]
impl VolumeProvider for LinuxVolumes {
    async fn list(&self) -> io::Result<Vec<VolumeSnapshot>> {
        let text = tokio::fs::read_to_string("/proc/mounts").await?;
        let lines = parse_mounts(&text);
        Ok(tokio::task::spawn_blocking(move || {
            lines.iter().map(Self::snapshot).collect()
        })
        .await
        .unwrap_or_default())
    }
}

/// Scripted provider for tests: `set` replaces what the next `list` sees.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Default)]
pub struct FakeVolumes {
    volumes: parking_lot::Mutex<Vec<VolumeSnapshot>>,
    fail_next: std::sync::atomic::AtomicBool,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeVolumes {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::default())
    }

    pub fn set(&self, volumes: Vec<VolumeSnapshot>) {
        *self.volumes.lock() = volumes;
    }

    pub fn fail_next(&self) {
        self.fail_next
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// Convenience snapshot for a plain removable stick.
    pub fn stick(serial: &str, mount: impl Into<PathBuf>) -> VolumeSnapshot {
        VolumeSnapshot {
            serial: Serial::new(serial),
            mount: mount.into(),
            info: VolumeInfo {
                label: serial.to_string(),
                fs_type: "vfat".to_string(),
                total_bytes: 8 << 30,
                usable_bytes: 4 << 30,
            },
            system_disk: false,
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl VolumeProvider for std::sync::Arc<FakeVolumes> {
    async fn list(&self) -> io::Result<Vec<VolumeSnapshot>> {
        if self
            .fail_next
            .swap(false, std::sync::atomic::Ordering::SeqCst)
        {
            return Err(io::Error::other("scripted enumeration failure"));
        }
        Ok(self.volumes.lock().clone())
    }
}

#[cfg(test)]
#[path = "volumes_tests.rs"]
mod tests;
