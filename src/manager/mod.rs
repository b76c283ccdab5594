//! Snapshot lifecycle workflows.
//!
//! [`SnapshotManager`] drives the two batch workflows over a
//! [`ResourceGateway`] and a [`SnapshotLedger`]:
//!
//! - [`SnapshotManager::snapshot`] snapshots every volume carrying the backup
//!   tag and stamps each snapshot with its deletion time.
//! - [`SnapshotManager::prune`] deletes the snapshots whose deletion time has
//!   passed.
//!
//! Resources are processed one at a time. A failure on one resource is
//! logged and counted, then the workflow moves on; only a failed listing
//! aborts a run.
//!
//! # Example
//!
//! ```rust,ignore
//! let manager = SnapshotManager::new(gateway, ledger, ManagerOptions::from_config(&config));
//! let result = manager.snapshot().await?;
//! println!("{}", result.summary());
//! ```

mod prune;
mod snapshot;

pub use prune::PruneRunResult;
pub use snapshot::SnapshotRunResult;

use crate::config::{AutosnapConfig, DEFAULT_DESCRIPTION, DEFAULT_SNAPSHOT_SUFFIX, TagKeys};
use crate::gateway::ResourceGateway;
use crate::ledger::SnapshotLedger;
use crate::policy::DEFAULT_RETENTION_DAYS;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Source of the current time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Settings for the workflows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Tag keys.
    pub tags: TagKeys,
    /// Suffix appended to snapshot names.
    pub suffix: String,
    /// Description passed on snapshot creation.
    pub description: String,
    /// Retention when a volume has no usable retention tag.
    pub default_retention_days: u32,
    /// Deadline for one volume's create, tag and record steps.
    pub resource_timeout: Duration,
    /// Log and count without issuing mutating calls.
    pub dry_run: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            tags: TagKeys::default(),
            suffix: DEFAULT_SNAPSHOT_SUFFIX.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            default_retention_days: DEFAULT_RETENTION_DAYS,
            resource_timeout: crate::config::DEFAULT_RESOURCE_TIMEOUT,
            dry_run: false,
        }
    }
}

impl ManagerOptions {
    /// Builds options from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &AutosnapConfig) -> Self {
        Self {
            tags: config.tags.clone(),
            suffix: config.snapshot.suffix.clone(),
            description: config.snapshot.description.clone(),
            default_retention_days: config.snapshot.default_retention_days,
            resource_timeout: config.snapshot.resource_timeout,
            dry_run: config.dry_run,
        }
    }

    /// Sets dry-run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sets the per-volume deadline.
    #[must_use]
    pub const fn with_resource_timeout(mut self, timeout: Duration) -> Self {
        self.resource_timeout = timeout;
        self
    }
}

/// Runs the Snapshot and Prune workflows.
pub struct SnapshotManager<G, L> {
    gateway: G,
    ledger: L,
    options: ManagerOptions,
    clock: Clock,
}

impl<G, L> fmt::Debug for SnapshotManager<G, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotManager")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<G: ResourceGateway, L: SnapshotLedger> SnapshotManager<G, L> {
    /// Creates a manager using the system clock.
    #[must_use]
    pub fn new(gateway: G, ledger: L, options: ManagerOptions) -> Self {
        Self {
            gateway,
            ledger,
            options,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the gateway.
    #[must_use]
    pub const fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Returns the ledger.
    #[must_use]
    pub const fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Returns the options.
    #[must_use]
    pub const fn options(&self) -> &ManagerOptions {
        &self.options
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

/// Records one per-resource failure.
fn record_resource_failure(workflow: &'static str, step: &'static str) {
    metrics::counter!(
        "autosnap_resource_failures_total",
        "workflow" => workflow,
        "step" => step
    )
    .increment(1);
}

/// Converts a duration to whole milliseconds, saturating.
fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Converts `u64` to `f64` for histograms.
#[allow(clippy::cast_precision_loss)]
const fn u64_to_f64(value: u64) -> f64 {
    value as f64
}

/// Converts `usize` to `u64` for counters.
fn usize_to_u64(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}
