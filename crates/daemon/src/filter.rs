// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The file filter applied during traversal and watch drains

use pk_core::paths::{extension, is_hidden};
use pk_core::{schema, ConfigStore, SuffixMode, TimeUnit};
use std::fs::Metadata;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Pure acceptance predicate built from the Filter config category.
///
/// Rebuilt from the store at the start of every scan phase so preference
/// edits apply to the next pass.
#[derive(Debug, Clone)]
pub struct FileFilter {
    max_size: u64,
    age_window: Option<Duration>,
    include_hidden: bool,
    skip_symlinks: bool,
    suffix_mode: SuffixMode,
    whitelist: Vec<String>,
    blacklist: Vec<String>,
    allow_no_ext: bool,
}

impl FileFilter {
    pub fn from_config(config: &ConfigStore) -> Self {
        let age_window = if config.get(&schema::FILTER_TIME_ENABLED) {
            let unit: TimeUnit = config
                .get(&schema::FILTER_TIME_UNIT)
                .parse()
                .unwrap_or(TimeUnit::Days);
            Some(unit.duration(config.get(&schema::FILTER_TIME_VALUE)))
        } else {
            None
        };
        Self {
            max_size: config.get(&schema::FILTER_MAX_SIZE).max(0) as u64,
            age_window,
            include_hidden: config.get(&schema::INCLUDE_HIDDEN),
            skip_symlinks: config.get(&schema::SKIP_SYMLINKS),
            suffix_mode: config
                .get(&schema::SUFFIX_MODE)
                .parse()
                .unwrap_or(SuffixMode::None),
            whitelist: lowercase(config.get(&schema::SUFFIX_WHITELIST)),
            blacklist: lowercase(config.get(&schema::SUFFIX_BLACKLIST)),
            allow_no_ext: config.get(&schema::ALLOW_NO_EXT),
        }
    }

    pub fn include_hidden(&self) -> bool {
        self.include_hidden
    }

    pub fn skip_symlinks(&self) -> bool {
        self.skip_symlinks
    }

    /// Whether a regular file should be submitted for copying.
    pub fn accepts(&self, path: &Path, meta: &Metadata, now: SystemTime) -> bool {
        if meta.file_type().is_symlink() && self.skip_symlinks {
            return self.reject(path, "symlink");
        }
        if !self.include_hidden && is_hidden(path) {
            return self.reject(path, "hidden");
        }
        if self.max_size > 0 && meta.len() > self.max_size {
            return self.reject(path, "over max_size");
        }
        if let Some(window) = self.age_window {
            let fresh = meta
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age <= window);
            if !fresh {
                return self.reject(path, "outside age window");
            }
        }
        match self.suffix_mode {
            SuffixMode::None => true,
            SuffixMode::Whitelist => match extension(path) {
                Some(ext) if self.whitelist.contains(&ext) => true,
                Some(_) => self.reject(path, "not whitelisted"),
                None if self.allow_no_ext => true,
                None => self.reject(path, "no extension"),
            },
            SuffixMode::Blacklist => match extension(path) {
                Some(ext) if self.blacklist.contains(&ext) => {
                    self.reject(path, "blacklisted suffix")
                }
                _ => true,
            },
        }
    }

    fn reject(&self, path: &Path, reason: &str) -> bool {
        debug!(path = %path.display(), reason, "filtered out");
        false
    }
}

fn lowercase(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim_start_matches('.').to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;
