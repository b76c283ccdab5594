//! Resource gateway.
//!
//! Filtered, paginated read access to volumes and snapshots plus the
//! mutating calls the workflows need. Listing is all-or-nothing: a failed
//! page discards everything fetched so far in that call.
//!
//! # Layers
//!
//! ```text
//! SnapshotManager ──▶ ResourceGateway (PlatformGateway)
//!                          │  filters, pagination, request counting
//!                          ▼
//!                     ControlPlane (InMemoryControlPlane, ...)
//! ```

mod control_plane;
mod memory;
mod platform;
mod requests;

pub use control_plane::{
    ControlPlane, DescribeRequest, Filter, Page, SnapshotRecord, TAG_KEY_FILTER, VolumeRecord,
};
pub use memory::{DEFAULT_PAGE_SIZE, InMemoryControlPlane, PlatformState};
pub use platform::PlatformGateway;
pub use requests::{CountingRecorder, MetricsRecorder, RequestKind, RequestRecorder};

use crate::Result;
use crate::models::{Snapshot, SnapshotId, Tag, Volume, VolumeId};
use async_trait::async_trait;

/// Access to the platform resources the snapshot manager works on.
#[async_trait]
pub trait ResourceGateway: Send + Sync {
    /// Lists every volume carrying the backup tag key, in platform order.
    async fn list_eligible_volumes(&self) -> Result<Vec<Volume>>;

    /// Lists every snapshot carrying the delete-after tag key, in platform order.
    async fn list_candidate_snapshots(&self) -> Result<Vec<Snapshot>>;

    /// Starts a snapshot of a volume.
    ///
    /// The returned snapshot's ID is empty if the platform returned none.
    async fn create_snapshot(&self, volume_id: &VolumeId, description: &str) -> Result<Snapshot>;

    /// Adds tags to a resource.
    async fn tag_resource(&self, resource_id: &str, tags: &[Tag]) -> Result<()>;

    /// Deletes a snapshot.
    async fn delete_snapshot(&self, snapshot_id: &SnapshotId) -> Result<()>;
}
