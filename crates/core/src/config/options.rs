// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Enumerated option values carried by string config keys

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Eviction order used by the ghost-file recycler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecycleStrategy {
    /// Oldest last-access first.
    TimeFirst,
    /// Largest first.
    SizeFirst,
    /// TimeFirst normally, SizeFirst once storage is critical.
    Auto,
}

impl RecycleStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            RecycleStrategy::TimeFirst => "time_first",
            RecycleStrategy::SizeFirst => "size_first",
            RecycleStrategy::Auto => "auto",
        }
    }
}

impl fmt::Display for RecycleStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecycleStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "time_first" => Ok(RecycleStrategy::TimeFirst),
            "size_first" => Ok(RecycleStrategy::SizeFirst),
            "auto" => Ok(RecycleStrategy::Auto),
            other => Err(format!("unknown recycler strategy '{other}'")),
        }
    }
}

/// Severity of a free-space shortfall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageLevel {
    Low,
    Critical,
}

impl fmt::Display for StorageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorageLevel::Low => "low",
            StorageLevel::Critical => "critical",
        })
    }
}

/// How the suffix filter treats extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuffixMode {
    None,
    Whitelist,
    Blacklist,
}

impl FromStr for SuffixMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(SuffixMode::None),
            "whitelist" => Ok(SuffixMode::Whitelist),
            "blacklist" => Ok(SuffixMode::Blacklist),
            other => Err(format!("unknown suffix mode '{other}'")),
        }
    }
}

impl fmt::Display for SuffixMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SuffixMode::None => "none",
            SuffixMode::Whitelist => "whitelist",
            SuffixMode::Blacklist => "blacklist",
        })
    }
}

/// Unit for the age filter window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn duration(self, value: i64) -> Duration {
        let value = value.max(0) as u64;
        match self {
            TimeUnit::Minutes => Duration::from_secs(value * 60),
            TimeUnit::Hours => Duration::from_secs(value * 3600),
            TimeUnit::Days => Duration::from_secs(value * 86_400),
        }
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minutes" => Ok(TimeUnit::Minutes),
            "hours" => Ok(TimeUnit::Hours),
            "days" => Ok(TimeUnit::Days),
            other => Err(format!("unknown time unit '{other}'")),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        })
    }
}

#[cfg(test)]
#[path = "options_tests.rs"]
mod tests;
