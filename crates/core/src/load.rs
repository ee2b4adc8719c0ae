// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composite load score and its level bands

use serde::{Deserialize, Serialize};
use std::fmt;

/// Load bands driving the scheduler's batch decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadLevel {
    Low,
    Medium,
    High,
}

impl LoadLevel {
    /// `<40` is Low, `40..=70` Medium, `>70` High.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=39 => LoadLevel::Low,
            40..=70 => LoadLevel::Medium,
            _ => LoadLevel::High,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoadLevel::Low => "low",
            LoadLevel::Medium => "medium",
            LoadLevel::High => "high",
        }
    }
}

impl fmt::Display for LoadLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weighted composite of the four load signals, always in 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadScore {
    pub score: u8,
    pub level: LoadLevel,
}

impl LoadScore {
    pub fn new(score: u8) -> Self {
        let score = score.min(100);
        Self {
            score,
            level: LoadLevel::from_score(score),
        }
    }
}

impl fmt::Display for LoadScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.score, self.level)
    }
}

#[cfg(test)]
#[path = "load_tests.rs"]
mod tests;
