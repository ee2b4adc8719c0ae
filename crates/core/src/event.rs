// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events exported by the ingest core
//!
//! Serializes with `{"type": "area:name", ...fields}` format.

use crate::config::options::{RecycleStrategy, StorageLevel};
use crate::device::{DeviceState, Serial};
use crate::fmt::human_bytes;
use crate::task::CopyOutcome;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Events broadcast over the bus to every interested party, including the
/// external UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// First sighting of a serial in the device's whole lifetime.
    #[serde(rename = "device:new")]
    NewDeviceJoined { serial: Serial, label: String },

    #[serde(rename = "device:inserted")]
    DeviceInserted { serial: Serial, mount: PathBuf },

    #[serde(rename = "device:removed")]
    DeviceRemoved { serial: Serial },

    #[serde(rename = "device:state_changed")]
    DeviceStateChanged {
        serial: Serial,
        old: DeviceState,
        new: DeviceState,
    },

    #[serde(rename = "index:file_indexed")]
    FileIndexed {
        path: PathBuf,
        size: u64,
        total_indexed: usize,
    },

    #[serde(rename = "index:duplicate")]
    DuplicateDetected { path: PathBuf },

    #[serde(rename = "index:loaded")]
    IndexLoaded { count: usize },

    #[serde(rename = "index:saved")]
    IndexSaved { count: usize },

    #[serde(rename = "copy:completed")]
    CopyCompleted {
        source: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<PathBuf>,
        file_size: u64,
        bytes_copied: u64,
        result: CopyOutcome,
        at_ms: u64,
    },

    #[serde(rename = "storage:low")]
    StorageLow {
        work_dir: PathBuf,
        free: u64,
        threshold: u64,
        level: StorageLevel,
    },

    #[serde(rename = "storage:recovered")]
    StorageRecovered { work_dir: PathBuf, free: u64 },

    #[serde(rename = "storage:recycled")]
    FilesRecycled {
        files: Vec<PathBuf>,
        bytes_freed: u64,
        strategy: RecycleStrategy,
    },

    #[serde(rename = "storage:folders_deleted")]
    EmptyFoldersDeleted { folders: Vec<PathBuf>, count: usize },
}

/// Event kinds, used for typed bus subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewDeviceJoined,
    DeviceInserted,
    DeviceRemoved,
    DeviceStateChanged,
    FileIndexed,
    DuplicateDetected,
    IndexLoaded,
    IndexSaved,
    CopyCompleted,
    StorageLow,
    StorageRecovered,
    FilesRecycled,
    EmptyFoldersDeleted,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::NewDeviceJoined { .. } => EventKind::NewDeviceJoined,
            Event::DeviceInserted { .. } => EventKind::DeviceInserted,
            Event::DeviceRemoved { .. } => EventKind::DeviceRemoved,
            Event::DeviceStateChanged { .. } => EventKind::DeviceStateChanged,
            Event::FileIndexed { .. } => EventKind::FileIndexed,
            Event::DuplicateDetected { .. } => EventKind::DuplicateDetected,
            Event::IndexLoaded { .. } => EventKind::IndexLoaded,
            Event::IndexSaved { .. } => EventKind::IndexSaved,
            Event::CopyCompleted { .. } => EventKind::CopyCompleted,
            Event::StorageLow { .. } => EventKind::StorageLow,
            Event::StorageRecovered { .. } => EventKind::StorageRecovered,
            Event::FilesRecycled { .. } => EventKind::FilesRecycled,
            Event::EmptyFoldersDeleted { .. } => EventKind::EmptyFoldersDeleted,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::NewDeviceJoined { .. } => "device:new",
            Event::DeviceInserted { .. } => "device:inserted",
            Event::DeviceRemoved { .. } => "device:removed",
            Event::DeviceStateChanged { .. } => "device:state_changed",
            Event::FileIndexed { .. } => "index:file_indexed",
            Event::DuplicateDetected { .. } => "index:duplicate",
            Event::IndexLoaded { .. } => "index:loaded",
            Event::IndexSaved { .. } => "index:saved",
            Event::CopyCompleted { .. } => "copy:completed",
            Event::StorageLow { .. } => "storage:low",
            Event::StorageRecovered { .. } => "storage:recovered",
            Event::FilesRecycled { .. } => "storage:recycled",
            Event::EmptyFoldersDeleted { .. } => "storage:folders_deleted",
        }
    }

    /// Short human description for log windows and tracing.
    pub fn log_summary(&self) -> String {
        let t = self.name();
        match self {
            Event::NewDeviceJoined { serial, label } => {
                format!("[{t}] {serial} ({label})")
            }
            Event::DeviceInserted { serial, mount } => {
                format!("[{t}] {serial} at {}", mount.display())
            }
            Event::DeviceRemoved { serial } => format!("[{t}] {serial}"),
            Event::DeviceStateChanged { serial, old, new } => {
                format!("[{t}] {serial} {old} -> {new}")
            }
            Event::FileIndexed {
                path,
                size,
                total_indexed,
            } => format!(
                "[{t}] {} ({}) total={total_indexed}",
                path.display(),
                human_bytes(*size)
            ),
            Event::DuplicateDetected { path } => format!("[{t}] {}", path.display()),
            Event::IndexLoaded { count } => format!("[{t}] count={count}"),
            Event::IndexSaved { count } => format!("[{t}] count={count}"),
            Event::CopyCompleted {
                source,
                result,
                bytes_copied,
                ..
            } => format!(
                "[{t}] {} result={} copied={}",
                source.display(),
                result.as_str(),
                human_bytes(*bytes_copied)
            ),
            Event::StorageLow {
                free,
                threshold,
                level,
                ..
            } => format!(
                "[{t}] free={} threshold={} level={level}",
                human_bytes(*free),
                human_bytes(*threshold)
            ),
            Event::StorageRecovered { free, .. } => {
                format!("[{t}] free={}", human_bytes(*free))
            }
            Event::FilesRecycled {
                files,
                bytes_freed,
                strategy,
            } => format!(
                "[{t}] files={} freed={} strategy={strategy}",
                files.len(),
                human_bytes(*bytes_freed)
            ),
            Event::EmptyFoldersDeleted { count, .. } => format!("[{t}] count={count}"),
        }
    }
}

/// A stamped event as handed to subscribers.
///
/// `seq` is assigned by the bus when it accepts the event and is the
/// monotonic timestamp every ordering guarantee is stated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub seq: u64,
    pub epoch_ms: u64,
    pub event: Event,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
