// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pk-storage: Content-addressed index, its persistence, and space
//! reclamation

mod fs_util;
pub mod index;
pub mod index_file;
pub mod recycler;
pub mod serials;
pub mod verify;

pub use index::{Index, IndexEntry, InsertOutcome};
pub use index_file::{IndexFile, IndexFileError, INDEX_VERSION};
pub use recycler::{DiskSpace, Recycler, RecyclerConfig, SpaceProbe, SweepReport};
pub use serials::{KnownSerials, SerialStore};
pub use verify::{hash_file, verify_vault, VerifyReport};
