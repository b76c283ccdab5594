//! End-to-end workflow tests for autosnap.
//!
//! Each test wires a `SnapshotManager` to an in-memory control plane and a
//! `SQLite` ledger, then checks what the platform and the ledger look like
//! after a run.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::doc_markdown)]

use autosnap::gateway::{
    CountingRecorder, InMemoryControlPlane, PlatformGateway, RequestKind, SnapshotRecord,
    VolumeRecord,
};
use autosnap::ledger::{LedgerEntry, SnapshotLedger, SqliteLedger};
use autosnap::manager::{ManagerOptions, SnapshotManager};
use autosnap::models::{SnapshotId, Tag, VolumeId, find_exact};
use autosnap::policy::{format_delete_after, parse_delete_after};
use autosnap::{Error, TagKeys};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

type Manager = SnapshotManager<PlatformGateway<InMemoryControlPlane>, SqliteLedger>;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 4, 30, 15).single().unwrap()
}

fn volume(id: &str, tags: &[(&str, &str)]) -> VolumeRecord {
    VolumeRecord {
        volume_id: Some(id.to_string()),
        tags: tags.iter().map(|(k, v)| Tag::new(*k, *v)).collect(),
    }
}

fn snapshot(id: &str, volume_id: &str, delete_after: DateTime<Utc>) -> SnapshotRecord {
    SnapshotRecord {
        snapshot_id: Some(id.to_string()),
        volume_id: Some(volume_id.to_string()),
        start_time: Some(delete_after - TimeDelta::days(7)),
        description: Some("auto snapshot created by autosnap".to_string()),
        tags: vec![Tag::new("_DELETE_AFTER", format_delete_after(delete_after))],
    }
}

fn build(plane: InMemoryControlPlane, options: ManagerOptions) -> (Manager, Arc<CountingRecorder>) {
    let recorder = Arc::new(CountingRecorder::new());
    let gateway = PlatformGateway::with_recorder(plane, &options.tags, recorder.clone());
    let ledger = SqliteLedger::in_memory().expect("ledger");
    let manager = SnapshotManager::new(gateway, ledger, options).with_clock(Arc::new(now));
    (manager, recorder)
}

fn delete_after_of(record: &SnapshotRecord) -> DateTime<Utc> {
    let value = find_exact(&record.tags, "_DELETE_AFTER")
        .and_then(Tag::value)
        .expect("delete-after tag");
    parse_delete_after(value).expect("rfc3339")
}

/// vol-1 with retention 3 gets one snapshot expiring three days out, and the
/// ledger records it.
#[tokio::test]
async fn test_retention_tag_sets_delete_after() {
    let plane = InMemoryControlPlane::new();
    plane.add_volume(volume("vol-1", &[("backup", "yes"), ("retention", "3")]));
    let (manager, recorder) = build(plane, ManagerOptions::default());

    let result = manager.snapshot().await.expect("snapshot");
    assert_eq!(result.snapshots_recorded, 1);

    let snapshots = manager.gateway().control_plane().snapshots();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(delete_after_of(&snapshots[0]), now() + TimeDelta::hours(72));

    let entries = manager.ledger().list(10).await.expect("list");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].resource(), &VolumeId::new("vol-1"));

    assert_eq!(recorder.count(RequestKind::DescribeVolumes), 1);
    assert_eq!(recorder.count(RequestKind::CreateSnapshot), 1);
    assert_eq!(recorder.count(RequestKind::CreateTags), 1);
}

/// Retention tag lookup ignores case; bad or zero values fall back to 7 days.
#[tokio::test]
async fn test_retention_fallbacks() {
    let plane = InMemoryControlPlane::new();
    plane.add_volume(volume("vol-a", &[("backup", "1"), ("RETENTION", "2")]));
    plane.add_volume(volume("vol-b", &[("backup", "1"), ("retention", "0")]));
    plane.add_volume(volume("vol-c", &[("backup", "1"), ("retention", "abc")]));
    plane.add_volume(volume("vol-d", &[("backup", "1")]));
    let (manager, _) = build(plane, ManagerOptions::default());

    manager.snapshot().await.expect("snapshot");

    let by_volume = |id: &str| {
        manager
            .gateway()
            .control_plane()
            .snapshots()
            .into_iter()
            .find(|s| s.volume_id.as_deref() == Some(id))
            .map(|s| delete_after_of(&s) - now())
            .expect("snapshot for volume")
    };
    assert_eq!(by_volume("vol-a"), TimeDelta::days(2));
    assert_eq!(by_volume("vol-b"), TimeDelta::days(7));
    assert_eq!(by_volume("vol-c"), TimeDelta::days(7));
    assert_eq!(by_volume("vol-d"), TimeDelta::days(7));
}

/// Lowercase backup tags are matched by the listing filter; other casings
/// and untagged volumes are not.
#[tokio::test]
async fn test_backup_tag_filter_variants() {
    let plane = InMemoryControlPlane::new();
    plane.add_volume(volume("vol-exact", &[("Backup", "true")]));
    plane.add_volume(volume("vol-lower", &[("backup", "true")]));
    plane.add_volume(volume("vol-upper", &[("BACKUP", "true")]));
    plane.add_volume(volume("vol-none", &[("Name", "scratch")]));

    let options = ManagerOptions {
        tags: TagKeys {
            backup: "Backup".to_string(),
            ..TagKeys::default()
        },
        ..ManagerOptions::default()
    };
    let (manager, _) = build(plane, options);

    let result = manager.snapshot().await.expect("snapshot");
    assert_eq!(result.volumes_found, 2);

    let mut sources: Vec<_> = manager
        .gateway()
        .control_plane()
        .snapshots()
        .into_iter()
        .filter_map(|s| s.volume_id)
        .collect();
    sources.sort();
    assert_eq!(sources, vec!["vol-exact", "vol-lower"]);
}

/// snap-9 expired yesterday and is deleted with its ledger entry; snap-10
/// expires tomorrow and stays.
#[tokio::test]
async fn test_prune_deletes_only_expired() {
    let plane = InMemoryControlPlane::new();
    let expired = snapshot("snap-9", "vol-1", now() - TimeDelta::days(1));
    let pending = snapshot("snap-10", "vol-1", now() + TimeDelta::days(1));
    let expired_entry = LedgerEntry::new(
        VolumeId::new("vol-1"),
        SnapshotId::new("snap-9"),
        expired.start_time.unwrap() + TimeDelta::seconds(20),
    );
    let pending_entry = LedgerEntry::new(
        VolumeId::new("vol-1"),
        SnapshotId::new("snap-10"),
        pending.start_time.unwrap(),
    );
    plane.add_snapshot(expired);
    plane.add_snapshot(pending);
    let (manager, recorder) = build(plane, ManagerOptions::default());
    manager.ledger().store(&expired_entry).await.unwrap();
    manager.ledger().store(&pending_entry).await.unwrap();

    let result = manager.prune().await.expect("prune");
    assert_eq!(result.snapshots_checked, 2);
    assert_eq!(result.snapshots_deleted, 1);
    assert_eq!(recorder.count(RequestKind::DeleteSnapshot), 1);

    let remaining: Vec<_> = manager
        .gateway()
        .control_plane()
        .snapshots()
        .into_iter()
        .filter_map(|s| s.snapshot_id)
        .collect();
    assert_eq!(remaining, vec!["snap-10"]);
    assert_eq!(
        manager.ledger().list(10).await.unwrap(),
        vec![pending_entry]
    );
}

/// vol-2's create fails; vol-1 and vol-3 are still snapshotted.
#[tokio::test]
async fn test_create_failure_is_isolated() {
    let plane = InMemoryControlPlane::new();
    for id in ["vol-1", "vol-2", "vol-3"] {
        plane.add_volume(volume(id, &[("backup", "true")]));
    }
    plane.fail_create_for("vol-2");
    let (manager, recorder) = build(plane, ManagerOptions::default());

    let result = manager.snapshot().await.expect("snapshot");
    assert_eq!(result.snapshots_created, 2);
    assert_eq!(result.failures, 1);
    assert_eq!(recorder.count(RequestKind::CreateSnapshot), 3);
    assert_eq!(manager.ledger().count().unwrap(), 2);
}

/// A failing page aborts the listing and the run returns the error.
#[tokio::test]
async fn test_pagination_failure_returns_error() {
    let plane = InMemoryControlPlane::new().with_page_size(2);
    for i in 0..5 {
        plane.add_volume(volume(&format!("vol-{i}"), &[("backup", "true")]));
    }
    plane.fail_volume_page(2);
    let (manager, recorder) = build(plane, ManagerOptions::default());

    let err = manager.snapshot().await.expect_err("listing should fail");
    assert!(matches!(err, Error::Platform { .. }));
    assert_eq!(recorder.count(RequestKind::DescribeVolumes), 3);
    assert_eq!(recorder.count(RequestKind::CreateSnapshot), 0);
}

/// Every page is visited and all volumes are snapshotted in listing order.
#[tokio::test]
async fn test_pagination_visits_every_page() {
    let plane = InMemoryControlPlane::new().with_page_size(2);
    for i in 0..5 {
        plane.add_volume(volume(&format!("vol-{i}"), &[("backup", "true")]));
    }
    let (manager, recorder) = build(plane, ManagerOptions::default());

    let result = manager.snapshot().await.expect("snapshot");
    assert_eq!(result.volumes_found, 5);
    assert_eq!(recorder.count(RequestKind::DescribeVolumes), 3);

    let sources: Vec<_> = manager
        .gateway()
        .control_plane()
        .snapshots()
        .into_iter()
        .filter_map(|s| s.volume_id)
        .collect();
    assert_eq!(sources, vec!["vol-0", "vol-1", "vol-2", "vol-3", "vol-4"]);
}

/// A volume that never finishes creating times out; the next volume runs.
#[tokio::test]
async fn test_hanging_volume_times_out() {
    let plane = InMemoryControlPlane::new();
    plane.add_volume(volume("vol-slow", &[("backup", "true")]));
    plane.add_volume(volume("vol-fast", &[("backup", "true")]));
    plane.delay_create_for("vol-slow", Duration::from_secs(60));
    let options = ManagerOptions::default().with_resource_timeout(Duration::from_millis(100));
    let (manager, _) = build(plane, options);

    let result = manager.snapshot().await.expect("snapshot");
    assert_eq!(result.failures, 1);
    assert_eq!(result.snapshots_recorded, 1);
    let entries = manager.ledger().list(10).await.unwrap();
    assert_eq!(entries[0].resource(), &VolumeId::new("vol-fast"));
}

/// Snapshots whose deletion tag does not parse are never deleted.
#[tokio::test]
async fn test_unparsable_delete_after_is_kept() {
    let plane = InMemoryControlPlane::new();
    let mut record = snapshot("snap-1", "vol-1", now() - TimeDelta::days(30));
    record.tags = vec![Tag::new("_DELETE_AFTER", "2024-13-45")];
    plane.add_snapshot(record);
    let (manager, recorder) = build(plane, ManagerOptions::default());

    let result = manager.prune().await.expect("prune");
    assert_eq!(result.skipped_invalid, 1);
    assert_eq!(recorder.count(RequestKind::DeleteSnapshot), 0);
    assert_eq!(manager.gateway().control_plane().snapshots().len(), 1);
}

/// Snapshot then prune in one process: fresh snapshots survive the prune.
#[tokio::test]
async fn test_snapshot_then_prune() {
    let plane = InMemoryControlPlane::new();
    plane.add_volume(volume("vol-1", &[("backup", "true"), ("Name", "db")]));
    plane.add_snapshot(snapshot("snap-old", "vol-1", now() - TimeDelta::hours(1)));
    let (manager, _) = build(plane, ManagerOptions::default());

    manager.snapshot().await.expect("snapshot");
    let pruned = manager.prune().await.expect("prune");

    assert_eq!(pruned.snapshots_checked, 2);
    assert_eq!(pruned.snapshots_deleted, 1);
    let snapshots = manager.gateway().control_plane().snapshots();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(
        find_exact(&snapshots[0].tags, "volume-name").and_then(Tag::value),
        Some("db")
    );
}
