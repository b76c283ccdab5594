//! Command-level tests against a JSON platform state on disk.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use autosnap::cli::{Workflow, execute};
use autosnap::config::AutosnapConfig;
use autosnap::gateway::{PlatformState, SnapshotRecord, VolumeRecord};
use autosnap::ledger::{SnapshotLedger, SqliteLedger};
use autosnap::models::{Tag, find_exact};
use autosnap::policy::format_delete_after;
use chrono::{TimeDelta, Utc};
use std::path::Path;
use tempfile::TempDir;

fn write_state(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("state.json");
    let state = PlatformState {
        volumes: vec![
            VolumeRecord {
                volume_id: Some("vol-1".to_string()),
                tags: vec![Tag::new("backup", "true"), Tag::new("retention", "3")],
            },
            VolumeRecord {
                volume_id: Some("vol-2".to_string()),
                tags: vec![Tag::new("Name", "scratch")],
            },
        ],
        snapshots: vec![SnapshotRecord {
            snapshot_id: Some("snap-9".to_string()),
            volume_id: Some("vol-1".to_string()),
            start_time: Some(Utc::now() - TimeDelta::days(8)),
            description: None,
            tags: vec![Tag::new(
                "_DELETE_AFTER",
                format_delete_after(Utc::now() - TimeDelta::days(1)),
            )],
        }],
    };
    state.save(&path).expect("save state");
    path
}

fn config(dir: &TempDir, state: &Path) -> AutosnapConfig {
    let mut config = AutosnapConfig::default();
    config.platform_state = Some(state.to_path_buf());
    config.ledger_path = dir.path().join("ledger").join("ledger.db");
    config
}

#[tokio::test]
async fn test_run_persists_platform_state_and_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = write_state(&dir);
    let config = config(&dir, &state_path);

    let report = execute(&config, Workflow::Both, std::future::pending())
        .await
        .expect("run");
    assert_eq!(report.snapshot.as_ref().unwrap().snapshots_created, 1);
    assert_eq!(report.prune.as_ref().unwrap().snapshots_deleted, 1);

    let state = PlatformState::load(&state_path).expect("reload state");
    assert_eq!(state.snapshots.len(), 1);
    let created = &state.snapshots[0];
    assert_eq!(created.volume_id.as_deref(), Some("vol-1"));
    assert!(find_exact(&created.tags, "_DELETE_AFTER").is_some());

    let ledger = SqliteLedger::new(&config.ledger_path).expect("ledger");
    let entries = ledger.list(10).await.expect("list");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].resource().as_str(), "vol-1");
}

#[tokio::test]
async fn test_dry_run_leaves_state_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = write_state(&dir);
    let before = std::fs::read_to_string(&state_path).unwrap();
    let mut config = config(&dir, &state_path);
    config.dry_run = true;

    let report = execute(&config, Workflow::Both, std::future::pending())
        .await
        .expect("dry run");
    assert_eq!(report.snapshot.unwrap().snapshots_created, 1);
    assert_eq!(report.prune.unwrap().snapshots_expired, 1);

    assert_eq!(std::fs::read_to_string(&state_path).unwrap(), before);
}

#[tokio::test]
async fn test_prune_only_skips_snapshot_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = write_state(&dir);
    let config = config(&dir, &state_path);

    let report = execute(&config, Workflow::Prune, std::future::pending())
        .await
        .expect("prune");
    assert!(report.snapshot.is_none());

    let state = PlatformState::load(&state_path).unwrap();
    assert!(state.snapshots.is_empty());
}

#[tokio::test]
async fn test_interrupted_run_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = write_state(&dir);
    let config = config(&dir, &state_path);

    let result = execute(&config, Workflow::Both, std::future::ready(())).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_malformed_state_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("state.json");
    std::fs::write(&state_path, "{ not json").unwrap();
    let config = config(&dir, &state_path);

    let result = execute(&config, Workflow::Snapshot, std::future::pending()).await;
    assert!(matches!(result, Err(autosnap::Error::InvalidInput(_))));
}
