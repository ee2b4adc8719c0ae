// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pk-core: Domain types for the Packrat ingest daemon

pub mod checksum;
pub mod clock;
pub mod config;
pub mod device;
pub mod event;
pub mod fmt;
pub mod load;
pub mod paths;
pub mod task;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use checksum::{ChecksumError, ChecksumKey, ContentHasher, KEY_LEN};
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::options::{RecycleStrategy, StorageLevel, SuffixMode, TimeUnit};
pub use config::{schema, Category, ConfigError, ConfigStore, ConfigValue, Entry, ValueKind};
pub use device::{Device, DeviceError, DeviceState, Serial, VolumeInfo};
pub use event::{Delivery, Event, EventKind};
pub use load::{LoadLevel, LoadScore};
pub use task::{CopyOutcome, CopyTask};
