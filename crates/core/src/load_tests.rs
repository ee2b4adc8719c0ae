// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    zero = { 0, LoadLevel::Low },
    just_below_medium = { 39, LoadLevel::Low },
    medium_floor = { 40, LoadLevel::Medium },
    medium_ceiling = { 70, LoadLevel::Medium },
    just_above_medium = { 71, LoadLevel::High },
    max = { 100, LoadLevel::High },
)]
fn level_bands(score: u8, level: LoadLevel) {
    assert_eq!(LoadLevel::from_score(score), level);
    assert_eq!(LoadScore::new(score).level, level);
}

#[test]
fn score_clamps_to_hundred() {
    let s = LoadScore::new(250);
    assert_eq!(s.score, 100);
    assert_eq!(s.level, LoadLevel::High);
}

#[test]
fn levels_order_low_to_high() {
    assert!(LoadLevel::Low < LoadLevel::Medium);
    assert!(LoadLevel::Medium < LoadLevel::High);
}
