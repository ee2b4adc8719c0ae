// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The content-addressed dedup set

use parking_lot::Mutex;
use pk_core::ChecksumKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::error;

/// Metadata kept per indexed content key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub key: ChecksumKey,
    pub size: u64,
    /// Vault-relative artifact path; absent for entries whose artifact was
    /// recycled but are still remembered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
    pub inserted_at_ms: u64,
    pub last_access_ms: u64,
}

/// Result of an [`Index::insert_if_absent`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The key was new; payload is the index size after insertion.
    Inserted(usize),
    /// The key already existed with matching size; its last access was
    /// refreshed.
    Duplicate,
    /// The key existed with a different size. The insert is rejected and
    /// reported; the index is unchanged.
    Collision,
}

impl InsertOutcome {
    pub fn was_inserted(self) -> bool {
        matches!(self, InsertOutcome::Inserted(_))
    }
}

/// Checksum-keyed set with at-most-one entry per key.
///
/// Internally synchronized; `insert_if_absent` is atomic and iteration takes
/// a consistent snapshot. The dirty flag tells the saver whether a write-out
/// is due.
#[derive(Default)]
pub struct Index {
    entries: Mutex<HashMap<ChecksumKey, IndexEntry>>,
    dirty: AtomicBool,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &ChecksumKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Insert unless the key is already present.
    ///
    /// A size mismatch on an existing key means two distinct contents
    /// collided onto one digest; that is reported and refused, never fatal.
    pub fn insert_if_absent(&self, entry: IndexEntry) -> InsertOutcome {
        use std::collections::hash_map::Entry;

        let mut entries = self.entries.lock();
        let settled = match entries.entry(entry.key) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
                None
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if existing.size == entry.size {
                    existing.last_access_ms = existing.last_access_ms.max(entry.last_access_ms);
                    self.dirty.store(true, Ordering::Release);
                    Some(InsertOutcome::Duplicate)
                } else {
                    error!(
                        key = %entry.key,
                        existing_size = existing.size,
                        new_size = entry.size,
                        "digest collision detected; rejecting insert"
                    );
                    Some(InsertOutcome::Collision)
                }
            }
        };
        match settled {
            Some(outcome) => outcome,
            None => {
                self.dirty.store(true, Ordering::Release);
                InsertOutcome::Inserted(entries.len())
            }
        }
    }

    /// Refresh last access, if the key exists.
    pub fn touch(&self, key: &ChecksumKey, now_ms: u64) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.last_access_ms = entry.last_access_ms.max(now_ms);
            self.dirty.store(true, Ordering::Release);
        }
    }

    pub fn remove(&self, key: &ChecksumKey) -> Option<IndexEntry> {
        let removed = self.entries.lock().remove(key);
        if removed.is_some() {
            self.dirty.store(true, Ordering::Release);
        }
        removed
    }

    pub fn get(&self, key: &ChecksumKey) -> Option<IndexEntry> {
        self.entries.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Total bytes accounted by live artifacts.
    pub fn artifact_bytes(&self) -> u64 {
        self.entries
            .lock()
            .values()
            .filter(|e| e.destination.is_some())
            .map(|e| e.size)
            .sum()
    }

    /// Consistent point-in-time copy of every entry.
    pub fn snapshot(&self) -> Vec<IndexEntry> {
        self.entries.lock().values().cloned().collect()
    }

    /// Replace contents wholesale from a loaded file.
    pub fn hydrate(&self, loaded: Vec<IndexEntry>) -> usize {
        let mut entries = self.entries.lock();
        entries.clear();
        for entry in loaded {
            entries.insert(entry.key, entry);
        }
        self.dirty.store(false, Ordering::Release);
        entries.len()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Clear the dirty flag, returning whether it was set.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Mark dirty explicitly (used after mutating snapshots externally).
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }
}

#[cfg(test)]
#[path = "index_tests.rs"]
mod tests;
