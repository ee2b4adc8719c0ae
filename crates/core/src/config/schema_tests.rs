// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashSet;

#[test]
fn keys_are_unique() {
    let mut seen = HashSet::new();
    for meta in SCHEMA {
        assert!(seen.insert(meta.key), "duplicate key {}", meta.key);
    }
}

#[test]
fn defaults_match_declared_kind() {
    for meta in SCHEMA {
        assert_eq!((meta.default)().kind(), meta.kind, "key {}", meta.key);
    }
}

#[test]
fn defaults_pass_validation() {
    for meta in SCHEMA {
        validate(meta, &(meta.default)()).unwrap();
    }
}

#[test]
fn lookup_finds_every_key() {
    for meta in SCHEMA {
        assert!(entry(meta.key).is_some());
    }
    assert!(entry("no_such_key").is_none());
}

#[test]
fn typed_consts_agree_with_schema() {
    assert_eq!(MAX_POOL.key, "max_pool");
    assert_eq!(MAX_POOL.default_value(), 8);
    assert_eq!(MEDIUM_PERCENT.default_value(), 70);
    assert_eq!(HIGH_PERCENT.default_value(), 40);
    assert_eq!(LOW_BATCH.default_value(), 30);
    assert_eq!(MEDIUM_BATCH.default_value(), 50);
    assert_eq!(HIGH_BATCH.default_value(), 0);
    assert_eq!(HIGH_PRIORITY_THRESHOLD.default_value(), 80);
    assert_eq!(QUEUE_WEIGHT.default_value(), 35);
    assert_eq!(SPEED_WEIGHT.default_value(), 35);
    assert_eq!(THREAD_WEIGHT.default_value(), 15);
    assert_eq!(REJECTION_WEIGHT.default_value(), 15);
}

#[test]
fn negative_numbers_fail_validation() {
    let meta = entry("core_pool").unwrap();
    assert!(validate(meta, &ConfigValue::Long(-1)).is_err());
}

#[test]
fn percent_over_hundred_fails_validation() {
    let meta = entry("medium_percent").unwrap();
    assert!(validate(meta, &ConfigValue::Int(101)).is_err());
    assert!(validate(meta, &ConfigValue::Int(100)).is_ok());
}

#[test]
fn enum_strings_are_validated() {
    let meta = entry("recycler_strategy").unwrap();
    assert!(validate(meta, &ConfigValue::Str("auto".into())).is_ok());
    assert!(validate(meta, &ConfigValue::Str("mru".into())).is_err());
}

#[test]
fn kind_mismatch_fails_validation() {
    let meta = entry("watch_enabled").unwrap();
    assert!(validate(meta, &ConfigValue::Str("true".into())).is_err());
}
