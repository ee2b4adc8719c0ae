// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Known-serials persistence and the ordered in-memory set

use crate::fs_util::write_atomic;
use indexmap::IndexSet;
use pk_core::Serial;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Ordered set of serials the tracker has ever accepted.
///
/// Order is first-seen order and survives persistence round trips.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KnownSerials(IndexSet<Serial>);

impl KnownSerials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert preserving first-seen order; returns whether it was new.
    pub fn insert(&mut self, serial: Serial) -> bool {
        self.0.insert(serial)
    }

    pub fn remove(&mut self, serial: &Serial) -> bool {
        self.0.shift_remove(serial)
    }

    pub fn contains(&self, serial: &Serial) -> bool {
        self.0.contains(serial)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Serial> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Serial> for KnownSerials {
    fn from_iter<I: IntoIterator<Item = Serial>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Newline-delimited serial file alongside the index.
#[derive(Debug, Clone)]
pub struct SerialStore {
    path: PathBuf,
}

impl SerialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the persisted set; a missing file is an empty set.
    pub fn load(&self) -> io::Result<KnownSerials> {
        if !self.path.exists() {
            return Ok(KnownSerials::new());
        }
        let text = fs::read_to_string(&self.path)?;
        Ok(KnownSerials::from_iter(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(Serial::new),
        ))
    }

    /// Persist in iteration order, atomically.
    pub fn save(&self, serials: &KnownSerials) -> io::Result<()> {
        let mut body = String::new();
        for serial in serials.iter() {
            body.push_str(serial.as_str());
            body.push('\n');
        }
        write_atomic(&self.path, body.as_bytes())
    }
}

#[cfg(test)]
#[path = "serials_tests.rs"]
mod tests;
