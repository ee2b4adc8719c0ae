// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed, categorized, persisted configuration

mod format;
pub mod options;
pub mod schema;
mod store;
mod value;

pub use schema::{Category, Entry, EntryMeta};
pub use store::ConfigStore;
pub use value::{ConfigType, ConfigValue, ValueKind};

use thiserror::Error;

/// Errors from configuration parsing, validation, and persistence
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown config key: {0}")]
    UnknownKey(String),
    #[error("key {key}: expected {expected}, got {got}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        got: String,
    },
    #[error("key {key}: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("line {0}: missing '='")]
    MalformedLine(usize),
    #[error("unsupported config version {0}")]
    UnsupportedVersion(u64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}
