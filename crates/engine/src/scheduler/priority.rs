// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The priority rule: extension table plus a size tweak

use pk_core::paths::extension;
use std::path::Path;

const SMALL_FILE: u64 = 1024 * 1024;
const LARGE_FILE: u64 = 10 * 1024 * 1024;

/// Base priorities by extension; the table dominates the size adjustment
/// by an order of magnitude.
fn base_for(ext: Option<&str>) -> i16 {
    match ext {
        Some("pdf") => 10,
        Some("docx") => 9,
        Some("xlsx") => 9,
        Some("pptx") => 8,
        Some("txt") => 7,
        Some("jpg") => 6,
        Some("png") => 6,
        Some("tmp") => 1,
        Some("log") => 1,
        _ => 5,
    }
}

/// Priority of a file, a pure function of path and size.
///
/// `clamp(base * 10 + size_adj, 0, 100)` where small files (< 1 MiB) gain 2
/// and large files (>= 10 MiB) lose 2.
pub fn priority_for(path: &Path, size: u64) -> u8 {
    let base = base_for(extension(path).as_deref());
    let size_adj: i16 = if size < SMALL_FILE {
        2
    } else if size >= LARGE_FILE {
        -2
    } else {
        0
    };
    (base * 10 + size_adj).clamp(0, 100) as u8
}

#[cfg(test)]
#[path = "priority_tests.rs"]
mod tests;
