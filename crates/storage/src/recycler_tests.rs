// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pk_core::{ChecksumKey, EventKind, FakeClock};
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::{tempdir, TempDir};

/// Probe returning a scripted free-space figure.
struct FixedSpace(Arc<AtomicU64>);

impl SpaceProbe for FixedSpace {
    fn available(&self, _path: &Path) -> io::Result<u64> {
        Ok(self.0.load(Ordering::SeqCst))
    }
}

struct Fixture {
    _dir: TempDir,
    work: PathBuf,
    index: Arc<Index>,
    free: Arc<AtomicU64>,
    clock: FakeClock,
    recycler: Recycler<FakeClock>,
}

fn fixture() -> Fixture {
    let dir = tempdir().unwrap();
    let work = dir.path().join("vault");
    fs::create_dir_all(&work).unwrap();
    let index = Arc::new(Index::new());
    let free = Arc::new(AtomicU64::new(u64::MAX));
    let clock = FakeClock::new();
    clock.set_epoch_ms(1_000_000_000);
    let recycler = Recycler::new(
        index.clone(),
        &work,
        Box::new(FixedSpace(free.clone())),
        clock.clone(),
    );
    Fixture {
        _dir: dir,
        work,
        index,
        free,
        clock,
        recycler,
    }
}

fn config(strategy: RecycleStrategy) -> RecyclerConfig {
    RecyclerConfig {
        reserved_bytes: 1_000_000,
        max_bytes: 0,
        warning_enabled: true,
        strategy,
        protected_age: Duration::ZERO,
    }
}

/// Writes an artifact under the vault and registers its entry.
fn seed_artifact(fx: &Fixture, rel: &str, size: usize, last_access_ms: u64) -> ChecksumKey {
    let path = fx.work.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let content = vec![rel.len() as u8; size];
    fs::write(&path, &content).unwrap();
    let key = ChecksumKey::of_bytes(rel.as_bytes());
    fx.index.insert_if_absent(IndexEntry {
        key,
        size: size as u64,
        destination: Some(rel.into()),
        inserted_at_ms: 0,
        last_access_ms,
    });
    key
}

#[test]
fn plenty_of_space_does_nothing() {
    let fx = fixture();
    seed_artifact(&fx, "S1/a.bin", 100, 1);
    let report = fx.recycler.sweep(&config(RecycleStrategy::Auto)).unwrap();
    assert_eq!(report.bytes_freed, 0);
    assert!(report.events.is_empty());
    assert_eq!(fx.index.len(), 1);
}

#[test]
fn low_space_emits_warning_and_recycles_oldest_first() {
    let fx = fixture();
    let old = seed_artifact(&fx, "S1/old.bin", 600_000, 10);
    let new = seed_artifact(&fx, "S1/new.bin", 600_000, 999);
    fx.free.store(500_000, Ordering::SeqCst);

    let report = fx.recycler.sweep(&config(RecycleStrategy::TimeFirst)).unwrap();

    let kinds: Vec<_> = report.events.iter().map(Event::kind).collect();
    assert!(kinds.contains(&EventKind::StorageLow));
    assert!(kinds.contains(&EventKind::FilesRecycled));
    // shortfall is 500_000, one eviction covers it; the older entry goes
    assert!(!fx.index.contains(&old));
    assert!(fx.index.contains(&new));
    assert!(!fx.work.join("S1/old.bin").exists());
}

#[test]
fn critical_space_with_auto_evicts_largest_first() {
    let fx = fixture();
    let small = seed_artifact(&fx, "S1/small.bin", 1_000, 1);
    let big = seed_artifact(&fx, "S1/big.bin", 800_000, 999);
    fx.free.store(240_000, Ordering::SeqCst); // below reserved/4

    let report = fx.recycler.sweep(&config(RecycleStrategy::Auto)).unwrap();

    let low = report
        .events
        .iter()
        .find_map(|e| match e {
            Event::StorageLow { level, .. } => Some(*level),
            _ => None,
        })
        .unwrap();
    assert_eq!(low, StorageLevel::Critical);
    assert!(!fx.index.contains(&big));
    assert!(fx.index.contains(&small));
}

#[test]
fn protected_entries_are_never_selected() {
    let fx = fixture();
    let key = seed_artifact(&fx, "S1/fresh.bin", 600_000, 1);
    fx.free.store(500_000, Ordering::SeqCst);
    fx.clock.set_epoch_ms(1_000); // younger than protection window

    let mut cfg = config(RecycleStrategy::TimeFirst);
    cfg.protected_age = Duration::from_secs(3600);
    let report = fx.recycler.sweep(&cfg).unwrap();

    assert_eq!(report.bytes_freed, 0);
    assert!(fx.index.contains(&key));
    assert!(fx.work.join("S1/fresh.bin").exists());
}

#[test]
fn empty_folders_are_swept_after_recycling() {
    let fx = fixture();
    seed_artifact(&fx, "S1/sub/only.bin", 600_000, 1);
    fx.free.store(1, Ordering::SeqCst);

    let report = fx.recycler.sweep(&config(RecycleStrategy::TimeFirst)).unwrap();

    let folders = report
        .events
        .iter()
        .find_map(|e| match e {
            Event::EmptyFoldersDeleted { folders, .. } => Some(folders.clone()),
            _ => None,
        })
        .unwrap();
    assert!(folders.contains(&fx.work.join("S1/sub")));
    assert!(folders.contains(&fx.work.join("S1")));
    assert!(fx.work.exists());
}

#[test]
fn recovery_edge_emits_once() {
    let fx = fixture();
    fx.free.store(500_000, Ordering::SeqCst);
    let _ = fx.recycler.sweep(&config(RecycleStrategy::Auto)).unwrap();

    fx.free.store(u64::MAX, Ordering::SeqCst);
    let report = fx.recycler.sweep(&config(RecycleStrategy::Auto)).unwrap();
    assert_eq!(report.events.iter().map(Event::kind).collect::<Vec<_>>(), vec![
        EventKind::StorageRecovered
    ]);

    let quiet = fx.recycler.sweep(&config(RecycleStrategy::Auto)).unwrap();
    assert!(quiet.events.is_empty());
}

#[test]
fn warnings_can_be_disabled() {
    let fx = fixture();
    seed_artifact(&fx, "S1/a.bin", 600_000, 1);
    fx.free.store(500_000, Ordering::SeqCst);

    let mut cfg = config(RecycleStrategy::TimeFirst);
    cfg.warning_enabled = false;
    let report = fx.recycler.sweep(&cfg).unwrap();

    // recycling still happens, only the warning is suppressed
    let kinds: Vec<_> = report.events.iter().map(Event::kind).collect();
    assert!(!kinds.contains(&EventKind::StorageLow));
    assert!(kinds.contains(&EventKind::FilesRecycled));
}

#[test]
fn vault_budget_triggers_eviction_with_free_disk() {
    let fx = fixture();
    seed_artifact(&fx, "S1/a.bin", 300_000, 1);
    seed_artifact(&fx, "S1/b.bin", 300_000, 2);

    let mut cfg = config(RecycleStrategy::TimeFirst);
    cfg.max_bytes = 400_000;
    let report = fx.recycler.sweep(&cfg).unwrap();

    assert!(report.bytes_freed >= 200_000);
    assert!(fx.index.artifact_bytes() <= 400_000);
}

#[test]
fn missing_artifact_drops_entry_silently() {
    let fx = fixture();
    let key = seed_artifact(&fx, "S1/gone.bin", 600_000, 1);
    fs::remove_file(fx.work.join("S1/gone.bin")).unwrap();
    fx.free.store(500_000, Ordering::SeqCst);

    let report = fx.recycler.sweep(&config(RecycleStrategy::TimeFirst)).unwrap();
    assert!(!fx.index.contains(&key));
    assert_eq!(report.bytes_freed, 0);
}
