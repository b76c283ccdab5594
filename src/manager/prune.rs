//! Prune (delete) workflow.

use super::{
    SnapshotManager, duration_to_millis, record_resource_failure, u64_to_f64, usize_to_u64,
};
use crate::gateway::ResourceGateway;
use crate::ledger::{LedgerEntry, SnapshotLedger};
use crate::models::{Snapshot, find_exact};
use crate::policy::{is_expired, parse_delete_after};
use crate::Result;
use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Result of a Prune run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneRunResult {
    /// Candidate snapshots returned by the listing.
    pub snapshots_checked: usize,
    /// Snapshots whose deletion time has passed.
    pub snapshots_expired: usize,
    /// Snapshots deleted.
    pub snapshots_deleted: usize,
    /// Snapshots skipped because the deletion tag had no value or did not
    /// parse.
    pub skipped_invalid: usize,
    /// Failed deletions and ledger removals.
    pub failures: usize,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Duration of the run in milliseconds.
    pub duration_ms: u64,
}

impl PruneRunResult {
    /// Returns `true` if any deletion or ledger removal failed.
    #[must_use]
    pub const fn has_failures(&self) -> bool {
        self.failures > 0
    }

    /// Returns a human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.snapshots_expired == 0 {
            return format!(
                "No expired snapshots found ({} checked in {}ms)",
                self.snapshots_checked, self.duration_ms
            );
        }
        let action = if self.dry_run { "would delete" } else { "deleted" };
        let count = if self.dry_run {
            self.snapshots_expired
        } else {
            self.snapshots_deleted
        };
        format!(
            "{action} {count} of {} expired snapshots - checked {}, {} invalid, {} failed in {}ms",
            self.snapshots_expired,
            self.snapshots_checked,
            self.skipped_invalid,
            self.failures,
            self.duration_ms
        )
    }
}

/// Evaluation of one snapshot's deletion tag.
#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    /// No tag with the configured key.
    Untracked,
    /// The tag is present but unusable.
    Invalid,
    /// Deletion time not reached.
    Retained(DateTime<Utc>),
    /// Deletion time reached.
    Expired(DateTime<Utc>),
}

/// Evaluates the first tag whose key equals `delete_after_tag`.
fn evaluate(snapshot: &Snapshot, delete_after_tag: &str, now: DateTime<Utc>) -> Verdict {
    let Some(tag) = find_exact(&snapshot.tags, delete_after_tag) else {
        return Verdict::Untracked;
    };
    let Some(value) = tag.value() else {
        error!(
            snapshot_id = %snapshot.id,
            tag = delete_after_tag,
            "Deletion tag has no value"
        );
        return Verdict::Invalid;
    };
    match parse_delete_after(value) {
        Ok(deadline) if is_expired(deadline, now) => Verdict::Expired(deadline),
        Ok(deadline) => Verdict::Retained(deadline),
        Err(e) => {
            error!(
                snapshot_id = %snapshot.id,
                value,
                error = %e,
                "Deletion tag is not an RFC 3339 time"
            );
            Verdict::Invalid
        },
    }
}

impl<G: ResourceGateway, L: SnapshotLedger> SnapshotManager<G, L> {
    /// Deletes every snapshot whose deletion tag lies in the past.
    ///
    /// A snapshot is deleted only when its deletion tag parses and is not
    /// after the current time. Deleted snapshots are removed from the ledger;
    /// a ledger failure is logged and does not undo the deletion.
    ///
    /// # Errors
    ///
    /// Returns an error only if listing the candidate snapshots fails.
    #[instrument(
        name = "autosnap.manager.prune",
        skip(self),
        fields(
            run_id = %uuid::Uuid::new_v4(),
            workflow = "prune",
            dry_run = self.options.dry_run
        )
    )]
    pub async fn prune(&self) -> Result<PruneRunResult> {
        let start = Instant::now();
        let mut result = PruneRunResult {
            dry_run: self.options.dry_run,
            ..Default::default()
        };

        let snapshots = self.gateway.list_candidate_snapshots().await?;
        result.snapshots_checked = snapshots.len();
        let now = self.now();
        debug!(snapshot_count = snapshots.len(), %now, "Checking snapshots for expiry");

        for snapshot in &snapshots {
            match evaluate(snapshot, &self.options.tags.delete_after, now) {
                Verdict::Untracked => {
                    debug!(snapshot_id = %snapshot.id, "Snapshot has no exact deletion tag");
                },
                Verdict::Invalid => result.skipped_invalid += 1,
                Verdict::Retained(deadline) => {
                    info!(
                        snapshot_id = %snapshot.id,
                        delete_after = %deadline,
                        "Snapshot not yet expired"
                    );
                },
                Verdict::Expired(deadline) => {
                    result.snapshots_expired += 1;
                    self.prune_one(snapshot, deadline, &mut result).await;
                },
            }
        }

        result.duration_ms = duration_to_millis(start.elapsed());

        metrics::counter!(
            "autosnap_prune_runs_total",
            "dry_run" => result.dry_run.to_string()
        )
        .increment(1);
        metrics::counter!("autosnap_snapshots_deleted_total")
            .increment(usize_to_u64(result.snapshots_deleted));
        metrics::histogram!("autosnap_run_duration_ms", "workflow" => "prune")
            .record(u64_to_f64(result.duration_ms));

        info!(
            snapshots_checked = result.snapshots_checked,
            snapshots_expired = result.snapshots_expired,
            snapshots_deleted = result.snapshots_deleted,
            skipped_invalid = result.skipped_invalid,
            failures = result.failures,
            duration_ms = result.duration_ms,
            "Prune run completed"
        );

        Ok(result)
    }

    async fn prune_one(
        &self,
        snapshot: &Snapshot,
        deadline: DateTime<Utc>,
        result: &mut PruneRunResult,
    ) {
        if self.options.dry_run {
            info!(
                snapshot_id = %snapshot.id,
                delete_after = %deadline,
                "Dry run: would delete snapshot"
            );
            return;
        }

        if let Err(e) = self.gateway.delete_snapshot(&snapshot.id).await {
            warn!(snapshot_id = %snapshot.id, error = %e, "Failed to delete snapshot");
            result.failures += 1;
            record_resource_failure("prune", "delete");
            return;
        }
        result.snapshots_deleted += 1;
        info!(snapshot_id = %snapshot.id, delete_after = %deadline, "Deleted snapshot");

        let (Some(volume_id), Some(started_at)) = (&snapshot.volume_id, snapshot.start_time)
        else {
            warn!(
                snapshot_id = %snapshot.id,
                "Snapshot lacks volume id or start time; ledger entry not removed"
            );
            return;
        };

        let entry = LedgerEntry::new(volume_id.clone(), snapshot.id.clone(), started_at);
        match self.ledger.delete(&entry).await {
            Ok(true) => debug!(snapshot_id = %snapshot.id, "Removed ledger entry"),
            Ok(false) => debug!(snapshot_id = %snapshot.id, "No ledger entry to remove"),
            Err(e) => {
                warn!(snapshot_id = %snapshot.id, error = %e, "Failed to remove ledger entry");
                result.failures += 1;
                record_resource_failure("prune", "ledger");
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::ManagerOptions;
    use super::super::test_support::{fixed_now, manager, snapshot};
    use super::*;
    use crate::gateway::{InMemoryControlPlane, RequestKind};
    use crate::ledger::LedgerEntry;
    use crate::models::{SnapshotId, Tag, VolumeId};
    use crate::policy::format_delete_after;
    use chrono::TimeDelta;

    fn delete_after(at: DateTime<Utc>) -> Tag {
        Tag::new("_DELETE_AFTER", format_delete_after(at))
    }

    fn remaining(manager: &super::super::test_support::TestManager) -> Vec<String> {
        manager
            .gateway()
            .control_plane()
            .snapshots()
            .into_iter()
            .filter_map(|s| s.snapshot_id)
            .collect()
    }

    #[tokio::test]
    async fn test_expired_snapshot_deleted_and_unrecorded() {
        let plane = InMemoryControlPlane::new();
        let yesterday = fixed_now() - TimeDelta::days(1);
        let record = snapshot("snap-9", "vol-1", vec![delete_after(yesterday)]);
        let started_at = record.start_time.expect("start time");
        plane.add_snapshot(record);
        let (manager, _) = manager(plane, ManagerOptions::default());

        let entry = LedgerEntry::new(VolumeId::new("vol-1"), SnapshotId::new("snap-9"), started_at);
        manager.ledger().store(&entry).await.expect("seed ledger");

        let result = manager.prune().await.expect("prune run");
        assert_eq!(result.snapshots_checked, 1);
        assert_eq!(result.snapshots_deleted, 1);
        assert!(remaining(&manager).is_empty());
        assert!(!manager.ledger().contains(&entry));
    }

    #[tokio::test]
    async fn test_future_snapshot_untouched() {
        let plane = InMemoryControlPlane::new();
        let tomorrow = fixed_now() + TimeDelta::days(1);
        plane.add_snapshot(snapshot("snap-10", "vol-1", vec![delete_after(tomorrow)]));
        let (manager, recorder) = manager(plane, ManagerOptions::default());

        let result = manager.prune().await.expect("prune run");
        assert_eq!(result.snapshots_expired, 0);
        assert_eq!(recorder.count(RequestKind::DeleteSnapshot), 0);
        assert_eq!(remaining(&manager), vec!["snap-10".to_string()]);
    }

    #[tokio::test]
    async fn test_deadline_equal_to_now_is_expired() {
        let plane = InMemoryControlPlane::new();
        plane.add_snapshot(snapshot("snap-1", "vol-1", vec![delete_after(fixed_now())]));
        let (manager, _) = manager(plane, ManagerOptions::default());

        let result = manager.prune().await.expect("prune run");
        assert_eq!(result.snapshots_deleted, 1);
    }

    #[tokio::test]
    async fn test_invalid_tags_never_deleted() {
        let plane = InMemoryControlPlane::new();
        plane.add_snapshot(snapshot(
            "snap-1",
            "vol-1",
            vec![Tag::new("_DELETE_AFTER", "next tuesday")],
        ));
        plane.add_snapshot(snapshot("snap-2", "vol-1", vec![Tag::key_only("_DELETE_AFTER")]));
        let (manager, recorder) = manager(plane, ManagerOptions::default());

        let result = manager.prune().await.expect("prune run");
        assert_eq!(result.skipped_invalid, 2);
        assert_eq!(recorder.count(RequestKind::DeleteSnapshot), 0);
        assert_eq!(remaining(&manager).len(), 2);
    }

    #[tokio::test]
    async fn test_only_first_matching_tag_is_evaluated() {
        let plane = InMemoryControlPlane::new();
        let tomorrow = fixed_now() + TimeDelta::days(1);
        let yesterday = fixed_now() - TimeDelta::days(1);
        plane.add_snapshot(snapshot(
            "snap-1",
            "vol-1",
            vec![delete_after(tomorrow), delete_after(yesterday)],
        ));
        let (manager, _) = manager(plane, ManagerOptions::default());

        let result = manager.prune().await.expect("prune run");
        assert_eq!(result.snapshots_deleted, 0);
    }

    #[tokio::test]
    async fn test_valueless_first_tag_is_not_skipped_over() {
        let plane = InMemoryControlPlane::new();
        let yesterday = fixed_now() - TimeDelta::days(1);
        plane.add_snapshot(snapshot(
            "snap-1",
            "vol-1",
            vec![Tag::key_only("_DELETE_AFTER"), delete_after(yesterday)],
        ));
        let (manager, recorder) = manager(plane, ManagerOptions::default());

        let result = manager.prune().await.expect("prune run");
        assert_eq!(result.skipped_invalid, 1);
        assert_eq!(result.snapshots_deleted, 0);
        assert_eq!(recorder.count(RequestKind::DeleteSnapshot), 0);
        assert_eq!(remaining(&manager), vec!["snap-1".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_failure_continues() {
        let plane = InMemoryControlPlane::new();
        let yesterday = fixed_now() - TimeDelta::days(1);
        plane.add_snapshot(snapshot("snap-1", "vol-1", vec![delete_after(yesterday)]));
        plane.add_snapshot(snapshot("snap-2", "vol-1", vec![delete_after(yesterday)]));
        plane.fail_delete_for("snap-1");
        let (manager, _) = manager(plane, ManagerOptions::default());

        let result = manager.prune().await.expect("prune run");
        assert_eq!(result.snapshots_expired, 2);
        assert_eq!(result.snapshots_deleted, 1);
        assert_eq!(result.failures, 1);
        assert_eq!(remaining(&manager), vec!["snap-1".to_string()]);
    }

    #[tokio::test]
    async fn test_ledger_failure_does_not_undo_deletion() {
        let plane = InMemoryControlPlane::new();
        let yesterday = fixed_now() - TimeDelta::days(1);
        plane.add_snapshot(snapshot("snap-1", "vol-1", vec![delete_after(yesterday)]));
        let (manager, _) = manager(plane, ManagerOptions::default());
        manager.ledger().fail_writes();

        let result = manager.prune().await.expect("prune run");
        assert_eq!(result.snapshots_deleted, 1);
        assert_eq!(result.failures, 1);
        assert!(remaining(&manager).is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_without_source_is_still_deleted() {
        let plane = InMemoryControlPlane::new();
        let yesterday = fixed_now() - TimeDelta::days(1);
        let mut record = snapshot("snap-1", "vol-1", vec![delete_after(yesterday)]);
        record.volume_id = None;
        plane.add_snapshot(record);
        let (manager, _) = manager(plane, ManagerOptions::default());

        let result = manager.prune().await.expect("prune run");
        assert_eq!(result.snapshots_deleted, 1);
        assert_eq!(result.failures, 0);
    }

    #[tokio::test]
    async fn test_dry_run_counts_without_deleting() {
        let plane = InMemoryControlPlane::new();
        let yesterday = fixed_now() - TimeDelta::days(1);
        plane.add_snapshot(snapshot("snap-1", "vol-1", vec![delete_after(yesterday)]));
        let (manager, recorder) = manager(plane, ManagerOptions::default().with_dry_run(true));

        let result = manager.prune().await.expect("prune run");
        assert_eq!(result.snapshots_expired, 1);
        assert_eq!(result.snapshots_deleted, 0);
        assert_eq!(recorder.count(RequestKind::DeleteSnapshot), 0);
        assert!(result.summary().starts_with("would delete 1 of 1"));
    }

    #[test]
    fn test_evaluate_case_sensitive_key() {
        let snap = Snapshot {
            id: SnapshotId::new("snap-1"),
            volume_id: None,
            start_time: None,
            tags: vec![Tag::new("_delete_after", "2000-01-01T00:00:00Z")],
        };
        assert_eq!(evaluate(&snap, "_DELETE_AFTER", fixed_now()), Verdict::Untracked);
    }
}
