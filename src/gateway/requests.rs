//! Control-plane request accounting.
//!
//! Every request the gateway issues is counted by kind. Counts are an
//! observability side effect only: nothing in the workflows reads them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Kind of control-plane request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// One page of a volume listing.
    DescribeVolumes,
    /// One page of a snapshot listing.
    DescribeSnapshots,
    /// Snapshot creation.
    CreateSnapshot,
    /// Tagging a resource.
    CreateTags,
    /// Snapshot deletion.
    DeleteSnapshot,
}

impl RequestKind {
    /// All request kinds.
    pub const ALL: [Self; 5] = [
        Self::DescribeVolumes,
        Self::DescribeSnapshots,
        Self::CreateSnapshot,
        Self::CreateTags,
        Self::DeleteSnapshot,
    ];

    /// Returns the metric label for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DescribeVolumes => "describe_volumes",
            Self::DescribeSnapshots => "describe_snapshots",
            Self::CreateSnapshot => "create_snapshot",
            Self::CreateTags => "create_tags",
            Self::DeleteSnapshot => "delete_snapshot",
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::DescribeVolumes => 0,
            Self::DescribeSnapshots => 1,
            Self::CreateSnapshot => 2,
            Self::CreateTags => 3,
            Self::DeleteSnapshot => 4,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives one increment per issued control-plane request.
pub trait RequestRecorder: Send + Sync {
    /// Records that a request of `kind` was issued.
    fn record(&self, kind: RequestKind);
}

/// Records requests as Prometheus counters through the `metrics` facade.
///
/// Emits `autosnap_control_plane_requests_total{request="..."}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl RequestRecorder for MetricsRecorder {
    fn record(&self, kind: RequestKind) {
        metrics::counter!(
            "autosnap_control_plane_requests_total",
            "request" => kind.as_str()
        )
        .increment(1);
    }
}

/// Keeps request counts in memory.
#[derive(Debug, Default)]
pub struct CountingRecorder {
    counts: [AtomicU64; 5],
}

impl CountingRecorder {
    /// Creates a recorder with all counts at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many requests of `kind` were recorded.
    #[must_use]
    pub fn count(&self, kind: RequestKind) -> u64 {
        self.counts[kind.index()].load(Ordering::Relaxed)
    }

    /// Returns the total across all kinds.
    #[must_use]
    pub fn total(&self) -> u64 {
        RequestKind::ALL.iter().map(|kind| self.count(*kind)).sum()
    }
}

impl RequestRecorder for CountingRecorder {
    fn record(&self, kind: RequestKind) {
        self.counts[kind.index()].fetch_add(1, Ordering::Relaxed);
    }
}
