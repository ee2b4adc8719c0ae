// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pk-daemon: Device lifecycle tracking, per-device scanning, and the
//! embedding surface for the host application

pub mod app;
pub mod dispatch;
pub mod filter;
pub mod manager;
pub mod saver;
pub mod scanner;
pub mod volumes;

pub use app::{App, AppError, AppPaths};
pub use dispatch::CopyDispatcher;
pub use filter::FileFilter;
pub use manager::{DeviceControl, DeviceManager, DiscoveryService};
pub use saver::IndexSaver;
pub use scanner::{ScannerSupervisor, TaskSubmitter, WatchBatch};
pub use volumes::{LinuxVolumes, VolumeProvider, VolumeSnapshot};

#[cfg(any(test, feature = "test-support"))]
pub use volumes::FakeVolumes;
