//! End-to-end sessions between in-memory replicas.

mod common;

use bridge_traits::AssetRecord;
use common::{ids, MemoryRemote, Replica};
use core_auth::StaticTokenProvider;
use core_sync::{EngineState, SyncError, SyncOptions, SyncPhase};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test]
async fn test_merge_converges_both_sides() {
    let remote = MemoryRemote::new();
    remote.insert("b");
    remote.insert("c");
    let device = Replica::new(remote.clone());
    device.create(&["a", "b"]).await;

    let report = device.engine.merge_sync().await.unwrap();

    assert_eq!(report.uploaded, 1);
    assert_eq!(report.downloaded, 1);
    assert_eq!(report.deleted, 0);
    assert!(report.is_clean());
    assert_eq!(device.ids(), ids(&["a", "b", "c"]));
    assert_eq!(remote.ids(), ids(&["a", "b", "c"]));
}

#[tokio::test]
async fn test_second_session_changes_nothing() {
    let remote = MemoryRemote::new();
    remote.insert("r1");
    let device = Replica::new(remote.clone());
    device.create(&["l1", "l2"]).await;

    device.engine.merge_sync().await.unwrap();
    let puts = remote.puts.load(Ordering::SeqCst);
    let report = device.engine.merge_sync().await.unwrap();

    assert_eq!((report.uploaded, report.downloaded, report.deleted), (0, 0, 0));
    assert_eq!(remote.puts.load(Ordering::SeqCst), puts);
    assert_eq!(device.ids(), remote.ids());
}

#[tokio::test]
async fn test_downloaded_payload_is_binary() {
    let remote = MemoryRemote::new();
    remote.insert("sunset");
    let device = Replica::new(remote);

    device.engine.pull_from_cloud().await.unwrap();

    let stored = device.store.record("sunset").unwrap();
    assert!(stored.data.is_binary());
    assert_eq!(stored, common::record("sunset"));
}

#[tokio::test]
async fn test_deletion_reaches_other_device() {
    let remote = MemoryRemote::new();
    let phone = Replica::new(remote.clone());
    let laptop = Replica::new(remote.clone());
    phone.create(&["a", "b"]).await;
    phone.engine.merge_sync().await.unwrap();
    laptop.engine.merge_sync().await.unwrap();
    assert_eq!(laptop.ids(), ids(&["a", "b"]));

    phone.local.delete("a").await.unwrap();
    let report = phone.engine.merge_sync().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(remote.ids(), ids(&["b"]));
    assert!(remote.tombstones().contains("a"));

    let report = laptop.engine.merge_sync().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(report.uploaded, 0);
    assert_eq!(laptop.ids(), ids(&["b"]));
    assert!(laptop.tombstones.contains("a"));
}

#[tokio::test]
async fn test_stale_copy_is_not_uploaded_again() {
    let remote = MemoryRemote::new();
    remote.set_tombstones(&["old"]);
    let device = Replica::new(remote.clone());
    device.store.insert_raw("old");

    let report = device.engine.merge_sync().await.unwrap();

    assert_eq!(report.uploaded, 0);
    assert_eq!(report.deleted, 1);
    assert!(device.ids().is_empty());
    assert!(remote.ids().is_empty());
}

#[tokio::test]
async fn test_recreated_asset_survives_next_session() {
    let remote = MemoryRemote::new();
    let device = Replica::new(remote.clone());
    device.create(&["a"]).await;
    device.engine.merge_sync().await.unwrap();

    device.local.delete("a").await.unwrap();
    device.engine.merge_sync().await.unwrap();
    assert!(remote.tombstones().contains("a"));

    device.create(&["a"]).await;
    assert!(!device.tombstones.contains("a"));

    let report = device.engine.merge_sync().await.unwrap();

    assert_eq!(report.deleted, 0);
    assert_eq!(report.uploaded, 1);
    assert_eq!(device.ids(), ids(&["a"]));
    assert_eq!(remote.ids(), ids(&["a"]));
    assert!(!remote.tombstones().contains("a"));
}

#[tokio::test]
async fn test_tombstones_only_grow() {
    let remote = MemoryRemote::new();
    remote.set_tombstones(&["x", "y"]);
    let device = Replica::new(remote.clone());
    device.create(&["z"]).await;
    device.local.delete("z").await.unwrap();

    let before = remote.tombstones();
    device.engine.merge_sync().await.unwrap();
    let after = remote.tombstones();

    assert!(before.iter().all(|id| after.contains(id)));
    assert!(after.contains("z"));
    assert_eq!(device.tombstones.snapshot(), after);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_uploads_respect_limit() {
    let remote = MemoryRemote::new();
    remote.slow_puts(Duration::from_millis(50));
    let device = Replica::new(remote.clone());
    let names: Vec<String> = (0..12).map(|i| format!("inlay-{:02}", i)).collect();
    for name in &names {
        device.local.put(name, &common::record(name)).await.unwrap();
    }

    let report = device
        .engine
        .sync(SyncOptions::push().with_concurrency(3))
        .await
        .unwrap();

    assert_eq!(report.uploaded, 12);
    assert_eq!(remote.peak_in_flight.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_second_session_is_rejected() {
    let remote = MemoryRemote::new();
    let gate = remote.gate_preload();
    let device = Replica::new(remote.clone());
    device.create(&["a"]).await;
    let engine = device.engine.clone();

    let first = engine.merge_sync();
    let second = async {
        while !engine.is_sync_in_progress() {
            tokio::task::yield_now().await;
        }
        let rejected = engine.merge_sync().await;
        gate.notify_one();
        rejected
    };
    let (first, second) = tokio::join!(first, second);

    assert!(matches!(second, Err(SyncError::AlreadyInProgress)));
    assert_eq!(first.unwrap().uploaded, 1);
    assert!(!engine.is_sync_in_progress());
}

#[tokio::test]
async fn test_cancel_stops_uploads_and_releases_engine() {
    let remote = MemoryRemote::new();
    let device = Replica::new(remote.clone());
    let names: Vec<String> = (0..10).map(|i| format!("inlay-{}", i)).collect();
    for name in &names {
        device.local.put(name, &common::record(name)).await.unwrap();
    }

    let handle = device.engine.cancel_handle();
    remote.on_put(move |count| {
        if count == 2 {
            handle.cancel();
        }
    });

    let result = device
        .engine
        .sync(SyncOptions::push().with_concurrency(2))
        .await;

    assert!(matches!(result, Err(SyncError::Cancelled)));
    assert!(remote.puts.load(Ordering::SeqCst) < 10);
    assert_eq!(device.engine.state(), EngineState::Idle);
    assert!(!device.engine.is_sync_in_progress());
    assert!(!remote.index_loaded());

    // The next session is not affected and finishes the job
    remote.on_put(|_| {});
    let report = device.engine.push_to_cloud().await.unwrap();
    assert_eq!(remote.ids().len(), 10);
    assert!(report.uploaded > 0);
}

#[tokio::test]
async fn test_cancel_while_idle_is_ignored() {
    let remote = MemoryRemote::new();
    let device = Replica::new(remote.clone());
    device.create(&["a"]).await;

    device.engine.cancel_handle().cancel();
    let report = device.engine.merge_sync().await.unwrap();

    assert_eq!(report.uploaded, 1);
}

#[tokio::test]
async fn test_signed_out_user_cannot_sync() {
    let remote = MemoryRemote::new();
    let device = Replica::with_tokens(remote.clone(), Arc::new(StaticTokenProvider::signed_out()));
    device.create(&["a"]).await;

    let result = device.engine.merge_sync().await;

    assert!(matches!(result, Err(SyncError::NotAuthenticated)));
    assert!(remote.ids().is_empty());
    assert!(remote.tombstones().is_empty());
    assert!(!device.engine.is_sync_in_progress());
}

#[tokio::test]
async fn test_failed_item_is_reported_and_others_continue() {
    let remote = MemoryRemote::new();
    remote.fail_put("b");
    let device = Replica::new(remote.clone());
    device.create(&["a", "b", "c"]).await;

    let report = device.engine.push_to_cloud().await.unwrap();

    assert_eq!(report.uploaded, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].id, "b");
    assert!(report.errors[0].error.contains("HTTP 500"));
    assert_eq!(remote.ids(), ids(&["a", "c"]));
    assert_eq!(device.engine.state(), EngineState::Idle);
}

#[tokio::test]
async fn test_push_with_remote_prune() {
    let remote = MemoryRemote::new();
    remote.insert("a");
    remote.insert("orphan");
    let device = Replica::new(remote.clone());
    device.create(&["a", "new"]).await;

    let options = SyncOptions {
        delete_drive: true,
        ..SyncOptions::push()
    };
    let report = device.engine.sync(options).await.unwrap();

    assert_eq!(report.uploaded, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(remote.ids(), ids(&["a", "new"]));
    assert!(!remote.tombstones().contains("orphan"));
}

#[tokio::test]
async fn test_pull_with_local_prune() {
    let remote = MemoryRemote::new();
    remote.insert("a");
    remote.insert("b");
    let device = Replica::new(remote.clone());
    device.create(&["a", "local-only"]).await;

    let options = SyncOptions {
        delete_local: true,
        ..SyncOptions::pull()
    };
    let report = device.engine.sync(options).await.unwrap();

    assert_eq!(report.downloaded, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(device.ids(), ids(&["a", "b"]));
    assert!(!device.tombstones.contains("local-only"));
}

#[tokio::test]
async fn test_progress_reaches_complete() {
    let remote = MemoryRemote::new();
    remote.insert("r");
    let device = Replica::new(remote);
    device.create(&["l"]).await;

    let phases = Arc::new(Mutex::new(Vec::new()));
    let sink = phases.clone();
    device.engine.set_progress_callback(move |p| {
        let mut seen = sink.lock().unwrap();
        if seen.last() != Some(&p.phase) {
            seen.push(p.phase);
        }
    });

    device.engine.merge_sync().await.unwrap();

    assert_eq!(
        *phases.lock().unwrap(),
        vec![
            SyncPhase::Preparing,
            SyncPhase::Deleting,
            SyncPhase::Uploading,
            SyncPhase::Downloading,
            SyncPhase::Complete,
        ]
    );
    assert_eq!(device.engine.get_progress().percent(), 100);
}

#[tokio::test]
async fn test_clear_tombstones_empties_both_sides() {
    let remote = MemoryRemote::new();
    remote.set_tombstones(&["x"]);
    let device = Replica::new(remote.clone());
    device.engine.merge_sync().await.unwrap();
    assert!(device.tombstones.contains("x"));

    device.engine.clear_tombstones().await.unwrap();

    assert!(remote.tombstones().is_empty());
    assert!(device.tombstones.snapshot().is_empty());
    assert_eq!(
        device.settings.value(core_sync::LOCAL_TOMBSTONES_KEY).as_deref(),
        Some("[]")
    );
}

#[tokio::test]
async fn test_failed_index_preload_aborts_and_releases_session() {
    let remote = MemoryRemote::new();
    remote.insert("r");
    remote.fail_preload();
    let device = Replica::new(remote.clone());
    device.create(&["l"]).await;

    let result = device.engine.merge_sync().await;

    assert!(matches!(result, Err(SyncError::Transport(_))));
    assert!(!device.engine.is_sync_in_progress());
    assert_eq!(device.engine.state(), EngineState::Idle);
    assert!(!remote.index_loaded());
    assert_eq!(device.ids(), ids(&["l"]));
    assert_eq!(remote.ids(), ids(&["r"]));
    assert_eq!(remote.puts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_tombstone_read_aborts_before_any_transfer() {
    let remote = MemoryRemote::new();
    remote.insert("r");
    remote.fail_reads();
    let device = Replica::new(remote.clone());
    device.create(&["l"]).await;

    let result = device.engine.merge_sync().await;

    assert!(matches!(result, Err(SyncError::Transport(_))));
    assert!(!device.engine.is_sync_in_progress());
    assert!(!remote.index_loaded());
    assert_eq!(device.ids(), ids(&["l"]));
    assert_eq!(remote.ids(), ids(&["r"]));
    assert!(remote.tombstones().is_empty());
    assert_eq!(remote.puts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_recreated_during_session_is_not_deleted() {
    let remote = MemoryRemote::new();
    remote.insert("a");
    remote.set_tombstones(&["a"]);
    let gate = remote.gate_preload();
    let device = Replica::new(remote.clone());
    let engine = device.engine.clone();

    let session = engine.merge_sync();
    let recreate = async {
        // Tombstones are merged before the index preload waits on the gate
        while !device.tombstones.contains("a") {
            tokio::task::yield_now().await;
        }
        device.create(&["a"]).await;
        gate.notify_one();
    };
    let (report, ()) = tokio::join!(session, recreate);
    let report = report.unwrap();

    assert_eq!(report.deleted, 0);
    assert_eq!(device.ids(), ids(&["a"]));
    assert_eq!(remote.ids(), ids(&["a"]));
    assert!(!device.tombstones.contains("a"));

    // The next merge drops the stale remote entry
    device.engine.merge_sync().await.unwrap();
    assert!(!remote.tombstones().contains("a"));
    assert_eq!(device.ids(), ids(&["a"]));
}

#[tokio::test]
async fn test_progress_reports_asset_names() {
    let remote = MemoryRemote::new();
    let device = Replica::new(remote);
    let sunset = named_record("Sunset over the bay");
    device.local.put("3f2a", &sunset).await.unwrap();

    let names = Arc::new(Mutex::new(Vec::new()));
    let sink = names.clone();
    device.engine.set_progress_callback(move |p| {
        if p.phase == SyncPhase::Uploading {
            if let Some(name) = &p.current_item_name {
                sink.lock().unwrap().push(name.clone());
            }
        }
    });

    device.engine.push_to_cloud().await.unwrap();

    assert!(names
        .lock()
        .unwrap()
        .iter()
        .all(|name| name == "Sunset over the bay"));
    assert!(!names.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_cancelled_session_keeps_phase_progress() {
    let remote = MemoryRemote::new();
    let device = Replica::new(remote.clone());
    for i in 0..10 {
        let name = format!("inlay-{}", i);
        device.local.put(&name, &common::record(&name)).await.unwrap();
    }

    let handle = device.engine.cancel_handle();
    remote.on_put(move |count| {
        if count == 2 {
            handle.cancel();
        }
    });

    let result = device
        .engine
        .sync(SyncOptions::push().with_concurrency(1))
        .await;

    assert!(matches!(result, Err(SyncError::Cancelled)));
    let progress = device.engine.get_progress();
    assert_eq!(progress.phase, SyncPhase::Uploading);
    assert_eq!(progress.current, 2);
    assert_eq!(progress.total, 10);
    assert_eq!(remote.puts.load(Ordering::SeqCst), 2);
}

fn named_record(name: &str) -> AssetRecord {
    AssetRecord {
        name: name.to_string(),
        ..common::record("payload")
    }
}
