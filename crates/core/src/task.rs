// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Priority-tagged copy tasks and copy outcomes

use crate::device::Serial;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Terminal result of one copy attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyOutcome {
    Success,
    Fail,
    Cancel,
}

impl CopyOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CopyOutcome::Success => "success",
            CopyOutcome::Fail => "fail",
            CopyOutcome::Cancel => "cancel",
        }
    }
}

/// A unit of copy work, immutable once enqueued.
///
/// Devices are referenced by serial, never by owning handle. Ordering is
/// strictly (priority desc, creation nanos asc); the creation stamp comes
/// from the monotonic clock, not wall time.
#[derive(Debug, Clone)]
pub struct CopyTask {
    pub source: PathBuf,
    /// Path relative to the device mount root; fixes the vault layout.
    pub rel_path: PathBuf,
    pub serial: Serial,
    pub size: u64,
    /// 0..=100, higher dispatches first.
    pub priority: u8,
    pub created_ns: u64,
    pub cancel: CancellationToken,
}

impl CopyTask {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl PartialEq for CopyTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
            && self.created_ns == other.created_ns
            && self.source == other.source
    }
}

impl Eq for CopyTask {}

impl Ord for CopyTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: greater means dispatched first.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.created_ns.cmp(&self.created_ns))
            .then_with(|| other.source.cmp(&self.source))
    }
}

impl PartialOrd for CopyTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
