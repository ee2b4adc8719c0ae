// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn counter_grows_until_threshold() {
    let mut batch = WatchBatch::new(3);
    assert!(!batch.add("/a".into()));
    assert!(!batch.add("/b".into()));
    assert!(batch.add("/c".into()));
    assert_eq!(batch.len(), 3);
}

#[test]
fn duplicate_paths_count_once() {
    let mut batch = WatchBatch::new(2);
    assert!(!batch.add("/a".into()));
    assert!(!batch.add("/a".into()));
    assert!(batch.add("/b".into()));
}

#[test]
fn drain_resets_and_preserves_arrival_order() {
    let mut batch = WatchBatch::new(10);
    batch.add("/second".into());
    batch.add("/first-again".into());
    batch.add("/third".into());

    let drained = batch.drain();
    assert_eq!(
        drained,
        vec![
            PathBuf::from("/second"),
            PathBuf::from("/first-again"),
            PathBuf::from("/third")
        ]
    );
    assert!(batch.is_empty());
    assert_eq!(batch.len(), 0);
}

#[test]
fn threshold_of_one_fires_on_every_change() {
    let mut batch = WatchBatch::new(1);
    assert!(batch.add("/a".into()));
    batch.drain();
    assert!(batch.add("/b".into()));
}

#[test]
fn zero_threshold_is_clamped() {
    let mut batch = WatchBatch::new(0);
    assert!(batch.add("/a".into()));
}
