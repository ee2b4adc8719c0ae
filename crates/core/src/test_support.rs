// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builders and helpers shared by tests across crates

use crate::device::{Serial, VolumeInfo};
use crate::task::CopyTask;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Builder for [`CopyTask`] with sensible test defaults.
pub struct TaskBuilder {
    source: PathBuf,
    rel_path: Option<PathBuf>,
    serial: Serial,
    size: u64,
    priority: u8,
    created_ns: u64,
    cancel: CancellationToken,
}

impl TaskBuilder {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        let source: PathBuf = source.into();
        Self {
            source,
            rel_path: None,
            serial: Serial::new("TEST-SERIAL"),
            size: 1024,
            priority: 50,
            created_ns: 1,
            cancel: CancellationToken::new(),
        }
    }

    pub fn serial(mut self, serial: impl AsRef<str>) -> Self {
        self.serial = Serial::new(serial);
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn created_ns(mut self, created_ns: u64) -> Self {
        self.created_ns = created_ns;
        self
    }

    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> CopyTask {
        let rel_path = self.rel_path.unwrap_or_else(|| {
            self.source
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("file"))
        });
        CopyTask {
            source: self.source,
            rel_path,
            serial: self.serial,
            size: self.size,
            priority: self.priority,
            created_ns: self.created_ns,
            cancel: self.cancel,
        }
    }
}

/// A volume descriptor for tests.
pub fn test_volume(label: &str) -> VolumeInfo {
    VolumeInfo {
        label: label.to_string(),
        fs_type: "vfat".to_string(),
        total_bytes: 8 << 30,
        usable_bytes: 4 << 30,
    }
}
