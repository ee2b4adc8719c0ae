// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Insert-and-dedup scenarios over the assembled pipeline

use super::support::harness;
use pk_core::{CopyOutcome, Event, Serial};
use pk_daemon::FakeVolumes;

#[tokio::test]
async fn insert_then_dedup() {
    let h = harness();
    h.seed_file("x.pdf", &[7u8; 1024]);
    h.fake.set(vec![FakeVolumes::stick("A", h.mount_dir())]);

    h.app.start().await.unwrap();

    // first pass: joined, inserted, indexed, completed
    h.wait_for(|h| !h.events_matching("copy:completed").is_empty()).await;
    assert_eq!(h.events_matching("device:new").len(), 1);
    assert!(!h.events_matching("device:inserted").is_empty());

    let indexed = h.events_matching("index:file_indexed");
    assert_eq!(indexed.len(), 1);
    let Event::FileIndexed {
        size, total_indexed, ..
    } = &indexed[0]
    else {
        panic!("expected FileIndexed");
    };
    assert_eq!(*size, 1024);
    assert_eq!(*total_indexed, 1);

    let completed = h.events_matching("copy:completed");
    let Event::CopyCompleted {
        result,
        bytes_copied,
        destination,
        ..
    } = &completed[0]
    else {
        panic!("expected CopyCompleted");
    };
    assert_eq!(*result, CopyOutcome::Success);
    assert_eq!(*bytes_copied, 1024);
    assert!(destination.is_some());

    // same content under a new name: a re-scan dedups it away
    h.seed_file("copy-of-x.pdf", &[7u8; 1024]);
    h.app.manager().pause(&Serial::new("A")).unwrap();
    h.app.manager().resume(&Serial::new("A")).unwrap();

    h.wait_for(|h| !h.events_matching("index:duplicate").is_empty()).await;
    h.wait_for(|h| h.events_matching("copy:completed").len() >= 2).await;

    let completed = h.events_matching("copy:completed");
    let Event::CopyCompleted {
        result,
        bytes_copied,
        destination,
        ..
    } = completed.last().unwrap()
    else {
        panic!("expected CopyCompleted");
    };
    assert_eq!(*result, CopyOutcome::Success);
    assert_eq!(*bytes_copied, 1024);
    assert_eq!(*destination, None);

    // dedup invariant: one entry, one artifact
    assert_eq!(h.app.index().len(), 1);
    let artifacts: Vec<_> = walk_files(&h.vault());
    assert_eq!(artifacts.len(), 1);

    h.app.shutdown().await;
}

#[tokio::test]
async fn every_submission_is_accounted_for() {
    let h = harness();
    for i in 0..10 {
        h.seed_file(&format!("f{i}.bin"), &[i as u8; 256]);
    }
    h.fake.set(vec![FakeVolumes::stick("A", h.mount_dir())]);

    h.app.start().await.unwrap();
    h.wait_for(|h| h.events_matching("copy:completed").len() >= 10).await;
    h.app.shutdown().await;

    // submitted = success + fail + cancel; nothing vanished
    let completed = h.events_matching("copy:completed");
    assert_eq!(completed.len(), 10);
    assert!(completed.iter().all(|e| {
        matches!(
            e,
            Event::CopyCompleted {
                result: CopyOutcome::Success,
                ..
            }
        )
    }));
    assert_eq!(h.app.index().len(), 10);
}

#[tokio::test]
async fn config_round_trips_are_byte_identical() {
    let h = harness();
    let properties = h.config.export_properties();
    let other = pk_core::ConfigStore::in_memory();
    other.import_properties(&properties).unwrap();
    assert_eq!(other.export_properties(), properties);

    let json = h.config.export_json().unwrap();
    let other = pk_core::ConfigStore::in_memory();
    other.import_json(&json).unwrap();
    assert_eq!(other.export_json().unwrap(), json);
    h.app.shutdown().await;
}

fn walk_files(root: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files
}
