// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ghost reconciliation and event ordering over the assembled pipeline

use super::support::harness;
use pk_core::{DeviceState, Serial};
use pk_daemon::FakeVolumes;

#[tokio::test]
async fn ghost_reconciliation_across_scans() {
    let h = harness();
    let mnt_s1 = h.mount_dir().join("s1");
    let mnt_s2 = h.mount_dir().join("s2");
    std::fs::create_dir_all(&mnt_s1).unwrap();
    std::fs::create_dir_all(&mnt_s2).unwrap();

    // scan 1 sees {S1, S2}, both for the first time
    h.fake.set(vec![
        FakeVolumes::stick("S1", &mnt_s1),
        FakeVolumes::stick("S2", &mnt_s2),
    ]);
    h.app.start().await.unwrap();
    h.wait_for(|h| h.events_matching("device:inserted").len() >= 2).await;
    assert_eq!(h.events_matching("device:new").len(), 2);
    h.events.lock().clear();

    // scan 2 sees only {S1}: S2 becomes a ghost
    h.fake.set(vec![FakeVolumes::stick("S1", &mnt_s1)]);
    h.wait_for(|h| !h.events_matching("device:removed").is_empty()).await;
    assert_eq!(
        h.app.manager().device(&Serial::new("S2")).unwrap().state(),
        DeviceState::Offline
    );
    h.events.lock().clear();

    // scan 3 sees {S1, S2} again: inserted, never a second join
    h.fake.set(vec![
        FakeVolumes::stick("S1", &mnt_s1),
        FakeVolumes::stick("S2", &mnt_s2),
    ]);
    h.wait_for(|h| !h.events_matching("device:inserted").is_empty()).await;
    assert!(h.events_matching("device:new").is_empty());
    assert_eq!(
        h.app.manager().device(&Serial::new("S2")).unwrap().state(),
        DeviceState::Idle
    );

    h.app.shutdown().await;
}

#[tokio::test]
async fn each_subscriber_sees_events_in_acceptance_order() {
    let h = harness();
    let mnt = h.mount_dir();
    std::fs::create_dir_all(&mnt).unwrap();
    for i in 0..5 {
        h.seed_file(&format!("f{i}.bin"), &[i as u8; 64]);
    }
    h.fake.set(vec![FakeVolumes::stick("S1", &mnt)]);

    // independent ordered capture registered before startup
    let seqs = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seqs2 = seqs.clone();
    h.app.bus().subscribe(
        "order-check",
        pk_engine::EventFilter::All,
        move |delivery| {
            seqs2.lock().push(delivery.seq);
            Ok(None)
        },
    );

    h.app.start().await.unwrap();
    h.wait_for(|h| h.events_matching("copy:completed").len() >= 5).await;
    h.app.shutdown().await;

    let seqs = seqs.lock();
    assert!(seqs.len() >= 5);
    assert!(
        seqs.windows(2).all(|w| w[0] < w[1]),
        "delivery order diverged from acceptance order: {seqs:?}"
    );
}

#[tokio::test]
async fn blacklisted_device_never_materializes() {
    let h = harness();
    let mnt = h.mount_dir();
    std::fs::create_dir_all(&mnt).unwrap();
    h.config
        .set(
            &pk_core::schema::DEVICE_BLACKLIST,
            vec!["EVIL".to_string()],
        )
        .unwrap();
    h.fake.set(vec![FakeVolumes::stick("EVIL", &mnt)]);

    h.app.start().await.unwrap();
    // give discovery a couple of passes
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert!(h.app.manager().device(&Serial::new("EVIL")).is_none());
    assert!(h.events_matching("device:new").is_empty());
    h.app.shutdown().await;
}
