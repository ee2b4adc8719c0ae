// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pk_core::ChecksumKey;
use tempfile::tempdir;

fn entry(content: &[u8]) -> IndexEntry {
    IndexEntry {
        key: ChecksumKey::of_bytes(content),
        size: content.len() as u64,
        destination: Some("S1/file.bin".into()),
        inserted_at_ms: 1_000,
        last_access_ms: 2_000,
    }
}

#[test]
fn save_then_load_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.json");
    let index = Index::new();
    index.insert_if_absent(entry(b"a"));
    index.insert_if_absent(entry(b"bb"));

    let saved = save(&path, &index).unwrap();
    assert_eq!(saved, 2);

    let loaded = Index::new();
    assert_eq!(load_into(&path, &loaded), 2);
    assert!(loaded.contains(&ChecksumKey::of_bytes(b"a")));
    assert!(loaded.contains(&ChecksumKey::of_bytes(b"bb")));
}

#[test]
fn missing_file_loads_empty() {
    let dir = tempdir().unwrap();
    let index = Index::new();
    assert_eq!(load_into(&dir.path().join("nope.json"), &index), 0);
    assert!(index.is_empty());
}

#[test]
fn malformed_file_starts_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.json");
    std::fs::write(&path, b"{ not json").unwrap();

    let index = Index::new();
    index.insert_if_absent(entry(b"stale"));
    assert_eq!(load_into(&path, &index), 0);
    assert!(index.is_empty());
}

#[test]
fn wrong_version_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.json");
    std::fs::write(&path, br#"{"v": 99, "saved_at": "2026-01-01T00:00:00Z", "entries": []}"#)
        .unwrap();
    assert!(matches!(
        load(&path),
        Err(IndexFileError::UnsupportedVersion(99))
    ));
}

#[test]
fn save_does_not_leave_temp_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.json");
    save(&path, &Index::new()).unwrap();
    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names, vec![std::ffi::OsString::from("index.json")]);
}

#[test]
fn file_carries_version_field() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.json");
    save(&path, &Index::new()).unwrap();
    let doc: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(doc["v"], 1);
    assert!(doc["entries"].as_array().unwrap().is_empty());
}
