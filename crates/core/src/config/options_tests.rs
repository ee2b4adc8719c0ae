// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    time_first = { "time_first", RecycleStrategy::TimeFirst },
    size_first = { "size_first", RecycleStrategy::SizeFirst },
    auto = { "auto", RecycleStrategy::Auto },
)]
fn strategy_round_trips(text: &str, strategy: RecycleStrategy) {
    assert_eq!(text.parse::<RecycleStrategy>().unwrap(), strategy);
    assert_eq!(strategy.as_str(), text);
}

#[test]
fn unknown_strategy_is_rejected() {
    assert!("lru".parse::<RecycleStrategy>().is_err());
}

#[test]
fn storage_levels_order() {
    assert!(StorageLevel::Low < StorageLevel::Critical);
}

#[parameterized(
    minutes = { TimeUnit::Minutes, 2, 120 },
    hours = { TimeUnit::Hours, 3, 10_800 },
    days = { TimeUnit::Days, 1, 86_400 },
)]
fn time_unit_durations(unit: TimeUnit, value: i64, secs: u64) {
    assert_eq!(unit.duration(value), Duration::from_secs(secs));
}

#[test]
fn negative_age_clamps_to_zero() {
    assert_eq!(TimeUnit::Days.duration(-5), Duration::ZERO);
}

#[test]
fn suffix_mode_parses() {
    assert_eq!("whitelist".parse::<SuffixMode>().unwrap(), SuffixMode::Whitelist);
    assert!("allow".parse::<SuffixMode>().is_err());
}
