// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The authoritative config schema: every key, its type, default, and
//! category

use super::options::{RecycleStrategy, SuffixMode, TimeUnit};
use super::value::{ConfigType, ConfigValue, ValueKind};
use super::ConfigError;
use std::str::FromStr;

/// Config categories, in display/export order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    ThreadPool,
    Scanner,
    Index,
    Copy,
    Watch,
    Paths,
    Scheduler,
    RateLimit,
    Storage,
    Filter,
    Blacklist,
    LoadWeights,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::ThreadPool => "thread_pool",
            Category::Scanner => "scanner",
            Category::Index => "index",
            Category::Copy => "copy",
            Category::Watch => "watch",
            Category::Paths => "paths",
            Category::Scheduler => "scheduler",
            Category::RateLimit => "rate_limit",
            Category::Storage => "storage",
            Category::Filter => "filter",
            Category::Blacklist => "blacklist",
            Category::LoadWeights => "load_weights",
        }
    }
}

/// A typed schema entry; the `Entry` consts below are the public API for
/// reading and writing the store.
pub struct Entry<T: ConfigType> {
    pub key: &'static str,
    pub category: Category,
    pub description: &'static str,
    default: fn() -> T,
}

impl<T: ConfigType> Entry<T> {
    pub const fn new(
        key: &'static str,
        category: Category,
        description: &'static str,
        default: fn() -> T,
    ) -> Self {
        Self {
            key,
            category,
            description,
            default,
        }
    }

    pub fn default_value(&self) -> T {
        (self.default)()
    }
}

/// Type-erased schema row used for iteration, import/export, and validation.
pub struct EntryMeta {
    pub key: &'static str,
    pub category: Category,
    pub kind: ValueKind,
    pub default: fn() -> ConfigValue,
    pub description: &'static str,
}

macro_rules! config_schema {
    ($( $name:ident : $ty:ty = ($key:literal, $cat:ident, $default:expr, $desc:literal) ),* $(,)?) => {
        $(
            pub const $name: Entry<$ty> = Entry::new($key, Category::$cat, $desc, || $default);
        )*

        /// Declared schema order; drives export ordering and `reset_all`.
        pub static SCHEMA: &[EntryMeta] = &[
            $(
                EntryMeta {
                    key: $key,
                    category: Category::$cat,
                    kind: <$ty as ConfigType>::KIND,
                    default: || <$ty as ConfigType>::into_value($default),
                    description: $desc,
                },
            )*
        ];
    };
}

config_schema! {
    // Thread pool
    CORE_POOL: i64 = ("core_pool", ThreadPool, 2, "Workers kept warm when the queue is quiet"),
    MAX_POOL: i64 = ("max_pool", ThreadPool, 8, "Upper bound on concurrent copy workers"),
    KEEP_ALIVE_SEC: i64 = ("keep_alive_sec", ThreadPool, 60, "Seconds of quiet before surplus workers wind down"),
    QUEUE_CAPACITY: i64 = ("queue_capacity", ThreadPool, 64, "Bounded executor queue length"),

    // Scanner
    INITIAL_DELAY_SEC: i64 = ("initial_delay_sec", Scanner, 5, "Delay before the first device discovery pass"),
    SCAN_INTERVAL_SEC: i64 = ("scan_interval_sec", Scanner, 10, "Seconds between device discovery passes"),

    // Index
    SAVE_INITIAL_DELAY_SEC: i64 = ("save_initial_delay_sec", Index, 30, "Delay before the first index save"),
    SAVE_INTERVAL_SEC: i64 = ("save_interval_sec", Index, 60, "Seconds between index saves"),
    INDEX_PATH: String = ("index_path", Index, String::from("index.json"), "Index file location"),

    // Copy
    BUFFER_SIZE: i64 = ("buffer_size", Copy, 256 * 1024, "Copy block size in bytes"),
    HASH_BUFFER_SIZE: i64 = ("hash_buffer_size", Copy, 256 * 1024, "Digest block size for standalone hashing"),
    MAX_FILE_SIZE: i64 = ("max_file_size", Copy, 2 * 1024 * 1024 * 1024, "Files above this many bytes fail fast; 0 disables the gate"),
    RETRY_COUNT: i32 = ("retry_count", Copy, 3, "Attempts for transient per-path failures"),
    TIMEOUT_MS: i64 = ("timeout_ms", Copy, 30_000, "Per-operation I/O timeout"),

    // Watch
    WATCH_ENABLED: bool = ("watch_enabled", Watch, true, "Incremental filesystem watching after the initial walk"),
    WATCH_THRESHOLD: i32 = ("watch_threshold", Watch, 10, "Pending changes that force a batch drain"),
    WATCH_RESET_INTERVAL_SEC: i64 = ("watch_reset_interval_sec", Watch, 5, "Batch timer; drains whatever is pending"),

    // Paths
    WORK_PATH: String = ("work_path", Paths, String::from("vault"), "Root of the mirrored vault"),

    // Scheduler
    TICK_INTERVAL_MS: i64 = ("tick_interval_ms", Scheduler, 500, "Dispatcher tick period"),
    INITIAL_DELAY_MS: i64 = ("initial_delay_ms", Scheduler, 1_000, "Delay before the first dispatcher tick"),
    LOW_BATCH: i32 = ("low_batch", Scheduler, 30, "Tasks drained per tick under low load"),
    MEDIUM_BATCH: i32 = ("medium_batch", Scheduler, 50, "Tasks drained per tick under medium load"),
    HIGH_BATCH: i32 = ("high_batch", Scheduler, 0, "Tasks drained per tick under high load (accumulation)"),
    HIGH_PRIORITY_THRESHOLD: i32 = ("high_priority_threshold", Scheduler, 80, "Priority at or above which tasks bypass the batch budget"),

    // Rate limit
    COPY_RATE_LIMIT: i64 = ("copy_rate_limit", RateLimit, 0, "Current copy ceiling in bytes/sec; 0 is unbounded"),
    COPY_RATE_LIMIT_BASE: i64 = ("copy_rate_limit_base", RateLimit, 0, "Operator baseline the auto mode scales from"),
    AUTO_MODE_ENABLED: bool = ("auto_mode_enabled", RateLimit, true, "Scheduler may lower the ceiling under load"),
    LOW_PERCENT: i32 = ("low_percent", RateLimit, 100, "Ceiling percentage under low load"),
    MEDIUM_PERCENT: i32 = ("medium_percent", RateLimit, 70, "Ceiling percentage under medium load"),
    HIGH_PERCENT: i32 = ("high_percent", RateLimit, 40, "Ceiling percentage under high load"),
    BURST_SIZE: i64 = ("burst_size", RateLimit, 1024 * 1024, "Token bucket burst in bytes"),

    // Storage
    RESERVED_BYTES: i64 = ("reserved_bytes", Storage, 1024 * 1024 * 1024, "Free-space floor before recycling starts; critical at a quarter of this"),
    MAX_BYTES: i64 = ("max_bytes", Storage, 0, "Vault size ceiling; 0 is unlimited"),
    WARNING_ENABLED: bool = ("warning_enabled", Storage, true, "Emit storage events on threshold crossings"),
    RECYCLER_STRATEGY: String = ("recycler_strategy", Storage, String::from("auto"), "Eviction order: time_first, size_first, or auto"),
    PROTECTED_AGE_HOURS: i64 = ("protected_age_hours", Storage, 24, "Entries younger than this are never recycled"),

    // Filter
    FILTER_MAX_SIZE: i64 = ("max_size", Filter, 0, "Skip files above this many bytes; 0 disables"),
    FILTER_TIME_ENABLED: bool = ("time_enabled", Filter, false, "Only accept files modified within the age window"),
    FILTER_TIME_VALUE: i64 = ("time_value", Filter, 30, "Age window magnitude"),
    FILTER_TIME_UNIT: String = ("time_unit", Filter, String::from("days"), "Age window unit: minutes, hours, or days"),
    INCLUDE_HIDDEN: bool = ("include_hidden", Filter, false, "Accept dot-prefixed files and folders"),
    SKIP_SYMLINKS: bool = ("skip_symlinks", Filter, true, "Ignore symbolic links during traversal"),
    SUFFIX_MODE: String = ("suffix_mode", Filter, String::from("none"), "Extension filtering: none, whitelist, or blacklist"),
    SUFFIX_WHITELIST: Vec<String> = ("suffix_whitelist", Filter, vec![], "Extensions accepted in whitelist mode"),
    SUFFIX_BLACKLIST: Vec<String> = ("suffix_blacklist", Filter, vec![], "Extensions rejected in blacklist mode"),
    ALLOW_NO_EXT: bool = ("allow_no_ext", Filter, true, "Accept files without an extension in whitelist mode"),

    // Blacklist
    DEVICE_BLACKLIST: Vec<String> = ("device_blacklist_by_serial", Blacklist, vec![], "Serials ignored during discovery"),

    // Load weights
    QUEUE_WEIGHT: i32 = ("queue_weight", LoadWeights, 35, "Contribution cap of scheduler queue depth"),
    SPEED_WEIGHT: i32 = ("speed_weight", LoadWeights, 35, "Contribution cap of copy throughput"),
    THREAD_WEIGHT: i32 = ("thread_weight", LoadWeights, 15, "Contribution cap of worker activity"),
    REJECTION_WEIGHT: i32 = ("rejection_weight", LoadWeights, 15, "Contribution cap of recent rejections"),
}

/// Look up a schema row by key.
pub fn entry(key: &str) -> Option<&'static EntryMeta> {
    SCHEMA.iter().find(|meta| meta.key == key)
}

/// Validate a candidate value against schema rules.
///
/// Numeric entries must be non-negative, percentages capped at 100, and
/// enum-valued string keys must parse.
pub fn validate(meta: &EntryMeta, value: &ConfigValue) -> Result<(), ConfigError> {
    if value.kind() != meta.kind {
        return Err(ConfigError::TypeMismatch {
            key: meta.key.to_string(),
            expected: meta.kind.as_str(),
            got: value.kind().as_str().to_string(),
        });
    }
    let invalid = |reason: String| ConfigError::InvalidValue {
        key: meta.key.to_string(),
        reason,
    };
    let numeric = match value {
        ConfigValue::Int(v) => Some(i64::from(*v)),
        ConfigValue::Long(v) => Some(*v),
        _ => None,
    };
    if let Some(n) = numeric {
        if n < 0 {
            return Err(invalid(format!("must be non-negative, got {n}")));
        }
        if meta.key.ends_with("_percent") && n > 100 {
            return Err(invalid(format!("percentage out of range: {n}")));
        }
    }
    if let ConfigValue::Str(s) = value {
        match meta.key {
            "recycler_strategy" => {
                RecycleStrategy::from_str(s).map_err(invalid)?;
            }
            "suffix_mode" => {
                SuffixMode::from_str(s).map_err(invalid)?;
            }
            "time_unit" => {
                TimeUnit::from_str(s).map_err(invalid)?;
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
