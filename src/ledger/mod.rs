//! Snapshot ledger.
//!
//! A durable record of the snapshots autosnap created, keyed by source
//! volume, minute-truncated creation time and snapshot ID. Entries are
//! appended when a snapshot is tagged and removed when it is deleted; they
//! are never updated.
//!
//! The creation time is truncated to the whole minute when the entry is
//! built, so the key stays stable whatever sub-minute jitter separates the
//! platform's reported start time from the moment the entry is written or
//! removed.

mod memory;
mod sqlite;

pub use memory::InMemoryLedger;
pub use sqlite::SqliteLedger;

use crate::Result;
use crate::models::{SnapshotId, VolumeId};
use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use std::fmt;
use std::time::Instant;

/// Truncates a timestamp to the start of its minute.
#[must_use]
pub fn truncate_to_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

/// One ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LedgerEntry {
    resource: VolumeId,
    created_at: DateTime<Utc>,
    snapshot_id: SnapshotId,
}

impl LedgerEntry {
    /// Builds an entry, truncating `started_at` to the minute.
    #[must_use]
    pub fn new(resource: VolumeId, snapshot_id: SnapshotId, started_at: DateTime<Utc>) -> Self {
        Self {
            resource,
            created_at: truncate_to_minute(started_at),
            snapshot_id,
        }
    }

    /// Source volume.
    #[must_use]
    pub const fn resource(&self) -> &VolumeId {
        &self.resource
    }

    /// Snapshot identifier.
    #[must_use]
    pub const fn snapshot_id(&self) -> &SnapshotId {
        &self.snapshot_id
    }

    /// Minute-truncated creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.created_at.format("%Y-%m-%dT%H:%MZ"),
            self.resource,
            self.snapshot_id
        )
    }
}

/// Durable record of created snapshots.
///
/// Implementations serialize their own writes; callers take no locks.
#[async_trait]
pub trait SnapshotLedger: Send + Sync {
    /// Records a created snapshot. Storing an existing entry is a no-op.
    async fn store(&self, entry: &LedgerEntry) -> Result<()>;

    /// Removes a record. Returns `false` if no such entry existed.
    async fn delete(&self, entry: &LedgerEntry) -> Result<bool>;

    /// Returns up to `limit` entries, newest first.
    async fn list(&self, limit: usize) -> Result<Vec<LedgerEntry>>;
}

/// Records ledger operation metrics.
///
/// Emits `autosnap_ledger_operations_total` and
/// `autosnap_ledger_operation_duration_ms`, labelled by backend, operation
/// and status.
pub(crate) fn record_operation_metrics(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "autosnap_ledger_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "autosnap_ledger_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}
