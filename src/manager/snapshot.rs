//! Snapshot (create) workflow.

use super::{
    SnapshotManager, duration_to_millis, record_resource_failure, u64_to_f64, usize_to_u64,
};
use crate::gateway::ResourceGateway;
use crate::ledger::{LedgerEntry, SnapshotLedger};
use crate::models::Volume;
use crate::policy::{
    delete_after, format_delete_after, is_eligible_for_backup, resolve_retention_days,
    snapshot_name, snapshot_tags,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Result of a Snapshot run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotRunResult {
    /// Eligible volumes returned by the listing.
    pub volumes_found: usize,
    /// Snapshots created (or that would be, in a dry run).
    pub snapshots_created: usize,
    /// Snapshots whose tags were applied.
    pub snapshots_tagged: usize,
    /// Snapshots recorded in the ledger.
    pub snapshots_recorded: usize,
    /// Volumes whose processing failed or timed out at some step.
    pub failures: usize,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Duration of the run in milliseconds.
    pub duration_ms: u64,
}

impl SnapshotRunResult {
    /// Returns `true` if any volume failed.
    #[must_use]
    pub const fn has_failures(&self) -> bool {
        self.failures > 0
    }

    /// Returns a human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.volumes_found == 0 {
            return format!("No volumes eligible for backup ({}ms)", self.duration_ms);
        }
        if self.dry_run {
            return format!(
                "would snapshot {} of {} eligible volumes in {}ms",
                self.snapshots_created, self.volumes_found, self.duration_ms
            );
        }
        format!(
            "snapshotted {} of {} eligible volumes ({} tagged, {} recorded, {} failed) in {}ms",
            self.snapshots_created,
            self.volumes_found,
            self.snapshots_tagged,
            self.snapshots_recorded,
            self.failures,
            self.duration_ms
        )
    }
}

/// Steps completed for one volume; survives a timeout.
#[derive(Debug, Default)]
struct VolumeProgress {
    created: bool,
    tagged: bool,
    recorded: bool,
    failed_step: Option<&'static str>,
}

impl<G: ResourceGateway, L: SnapshotLedger> SnapshotManager<G, L> {
    /// Snapshots every volume carrying the backup tag.
    ///
    /// Each volume's create, tag and record steps run under the configured
    /// per-volume deadline. Failures are logged and counted in the result.
    ///
    /// # Errors
    ///
    /// Returns an error only if listing the eligible volumes fails.
    #[instrument(
        name = "autosnap.manager.snapshot",
        skip(self),
        fields(
            run_id = %uuid::Uuid::new_v4(),
            workflow = "snapshot",
            dry_run = self.options.dry_run
        )
    )]
    pub async fn snapshot(&self) -> Result<SnapshotRunResult> {
        let start = Instant::now();
        let mut result = SnapshotRunResult {
            dry_run: self.options.dry_run,
            ..Default::default()
        };

        let volumes = self.gateway.list_eligible_volumes().await?;
        result.volumes_found = volumes.len();
        debug!(volume_count = volumes.len(), "Listed eligible volumes");

        for volume in &volumes {
            if !is_eligible_for_backup(&volume.tags, &self.options.tags.backup) {
                debug!(volume_id = %volume.id, "Listed volume lacks the backup tag, skipping");
                continue;
            }
            self.snapshot_one(volume, &mut result).await;
        }

        result.duration_ms = duration_to_millis(start.elapsed());

        metrics::counter!(
            "autosnap_snapshot_runs_total",
            "dry_run" => result.dry_run.to_string()
        )
        .increment(1);
        metrics::counter!("autosnap_snapshots_created_total")
            .increment(usize_to_u64(if result.dry_run { 0 } else { result.snapshots_created }));
        metrics::histogram!("autosnap_run_duration_ms", "workflow" => "snapshot")
            .record(u64_to_f64(result.duration_ms));

        info!(
            volumes_found = result.volumes_found,
            snapshots_created = result.snapshots_created,
            snapshots_tagged = result.snapshots_tagged,
            snapshots_recorded = result.snapshots_recorded,
            failures = result.failures,
            duration_ms = result.duration_ms,
            "Snapshot run completed"
        );

        Ok(result)
    }

    async fn snapshot_one(&self, volume: &Volume, result: &mut SnapshotRunResult) {
        let now = self.now();
        let name = snapshot_name(&volume.id, now, &self.options.suffix);
        let days = resolve_retention_days(
            &volume.tags,
            &self.options.tags.retention,
            self.options.default_retention_days,
        );
        let Some(delete_at) = delete_after(now, days) else {
            warn!(
                volume_id = %volume.id,
                retention_days = days,
                "Retention period overflows the deletion deadline, skipping volume"
            );
            result.failures += 1;
            record_resource_failure("snapshot", "retention");
            return;
        };

        if self.options.dry_run {
            info!(
                volume_id = %volume.id,
                snapshot_name = %name,
                retention_days = days,
                delete_after = %format_delete_after(delete_at),
                "Dry run: would create snapshot"
            );
            result.snapshots_created += 1;
            return;
        }

        let timeout = self.options.resource_timeout;
        let mut progress = VolumeProgress::default();
        let outcome = tokio::time::timeout(
            timeout,
            self.create_tag_record(volume, &name, delete_at, now, &mut progress),
        )
        .await
        .unwrap_or_else(|_| {
            Err(Error::Timeout {
                operation: "snapshot_volume".to_string(),
                after: timeout,
            })
        });

        result.snapshots_created += usize::from(progress.created);
        result.snapshots_tagged += usize::from(progress.tagged);
        result.snapshots_recorded += usize::from(progress.recorded);

        if let Err(e) = outcome {
            let step = progress.failed_step.unwrap_or("timeout");
            warn!(
                volume_id = %volume.id,
                snapshot_name = %name,
                step,
                error = %e,
                "Failed to snapshot volume"
            );
            result.failures += 1;
            record_resource_failure("snapshot", step);
        }
    }

    /// Creates, tags and records one snapshot, updating `progress` as each
    /// step completes.
    async fn create_tag_record(
        &self,
        volume: &Volume,
        name: &str,
        delete_at: DateTime<Utc>,
        now: DateTime<Utc>,
        progress: &mut VolumeProgress,
    ) -> Result<()> {
        progress.failed_step = Some("create");
        let snapshot = self
            .gateway
            .create_snapshot(&volume.id, &self.options.description)
            .await?;
        if snapshot.id.is_empty() {
            return Err(Error::platform(
                "create_snapshot",
                format!("no snapshot id returned for volume '{}'", volume.id),
            ));
        }
        progress.created = true;
        info!(
            volume_id = %volume.id,
            snapshot_id = %snapshot.id,
            snapshot_name = %name,
            "Created snapshot"
        );

        progress.failed_step = Some("tag");
        let tags = snapshot_tags(name, &self.options.tags.delete_after, delete_at, &volume.tags);
        self.gateway
            .tag_resource(snapshot.id.as_str(), &tags)
            .await?;
        progress.tagged = true;
        debug!(
            snapshot_id = %snapshot.id,
            delete_after = %format_delete_after(delete_at),
            "Tagged snapshot"
        );

        progress.failed_step = Some("ledger");
        let started_at = snapshot.start_time.unwrap_or(now);
        let entry = LedgerEntry::new(volume.id.clone(), snapshot.id.clone(), started_at);
        self.ledger.store(&entry).await?;
        progress.recorded = true;
        progress.failed_step = None;

        Ok(())
    }
}
