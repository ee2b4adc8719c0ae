// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for the scenario tests

use parking_lot::Mutex;
use pk_core::{schema, ConfigStore, Event, SystemClock};
use pk_daemon::{App, AppPaths, FakeVolumes};
use pk_engine::EventFilter;
use std::sync::Arc;
use std::time::Duration;

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub fake: Arc<FakeVolumes>,
    pub config: Arc<ConfigStore>,
    pub app: App<Arc<FakeVolumes>, SystemClock>,
    pub events: Arc<Mutex<Vec<Event>>>,
}

/// An app over a temp state dir with fast timers and no watch phase.
pub fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(ConfigStore::in_memory());
    config.set(&schema::INITIAL_DELAY_SEC, 0).unwrap();
    config.set(&schema::SCAN_INTERVAL_SEC, 1).unwrap();
    config.set(&schema::INITIAL_DELAY_MS, 5).unwrap();
    config.set(&schema::TICK_INTERVAL_MS, 20).unwrap();
    config.set(&schema::WATCH_ENABLED, false).unwrap();

    let fake = FakeVolumes::new();
    let app = App::new(
        config.clone(),
        fake.clone(),
        SystemClock,
        AppPaths::new(dir.path().join("state")),
    )
    .unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let events2 = events.clone();
    app.bus().subscribe("spec-capture", EventFilter::All, move |delivery| {
        events2.lock().push(delivery.event.clone());
        Ok(None)
    });

    Harness {
        dir,
        fake,
        config,
        app,
        events,
    }
}

impl Harness {
    pub fn mount_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("mnt")
    }

    pub fn vault(&self) -> std::path::PathBuf {
        self.dir.path().join("state/vault")
    }

    pub fn seed_file(&self, rel: &str, content: &[u8]) {
        let path = self.mount_dir().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn event_names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(Event::name).collect()
    }

    pub fn events_matching(&self, name: &str) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.name() == name)
            .cloned()
            .collect()
    }

    pub async fn wait_for<F: FnMut(&Harness) -> bool>(&self, mut cond: F) {
        for _ in 0..1_000 {
            if cond(self) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached; events so far: {:?}", self.event_names());
    }
}
