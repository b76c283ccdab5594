//! Gateway over a [`ControlPlane`].

use super::control_plane::{ControlPlane, DescribeRequest, Filter};
use super::requests::{MetricsRecorder, RequestKind, RequestRecorder};
use super::ResourceGateway;
use crate::Result;
use crate::config::TagKeys;
use crate::models::{Snapshot, SnapshotId, Tag, Volume, VolumeId};
use crate::policy::backup_tag_filter_values;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Resource gateway that builds tag filters and walks pagination.
pub struct PlatformGateway<C: ControlPlane> {
    control_plane: C,
    backup_tag: String,
    delete_after_tag: String,
    recorder: Arc<dyn RequestRecorder>,
}

impl<C: ControlPlane> PlatformGateway<C> {
    /// Creates a gateway counting requests through [`MetricsRecorder`].
    #[must_use]
    pub fn new(control_plane: C, tags: &TagKeys) -> Self {
        Self::with_recorder(control_plane, tags, Arc::new(MetricsRecorder))
    }

    /// Creates a gateway with an explicit request recorder.
    #[must_use]
    pub fn with_recorder(
        control_plane: C,
        tags: &TagKeys,
        recorder: Arc<dyn RequestRecorder>,
    ) -> Self {
        Self {
            control_plane,
            backup_tag: tags.backup.clone(),
            delete_after_tag: tags.delete_after.clone(),
            recorder,
        }
    }

    /// Returns the underlying control plane.
    #[must_use]
    pub const fn control_plane(&self) -> &C {
        &self.control_plane
    }

    fn volume_filters(&self) -> Vec<Filter> {
        vec![Filter::tag_key(backup_tag_filter_values(&self.backup_tag))]
    }

    fn snapshot_filters(&self) -> Vec<Filter> {
        vec![Filter::tag_key([self.delete_after_tag.as_str()])]
    }
}

#[async_trait]
impl<C: ControlPlane> ResourceGateway for PlatformGateway<C> {
    #[instrument(skip(self), fields(backup_tag = %self.backup_tag))]
    async fn list_eligible_volumes(&self) -> Result<Vec<Volume>> {
        let mut volumes = Vec::new();
        let mut request = DescribeRequest {
            filters: self.volume_filters(),
            next_token: None,
        };

        loop {
            let page = self.control_plane.describe_volumes(&request).await;
            self.recorder.record(RequestKind::DescribeVolumes);
            let page = page?;

            volumes.extend(page.items.into_iter().filter_map(|record| {
                let volume = record.into_volume();
                if volume.is_none() {
                    debug!("Skipping volume record without an ID");
                }
                volume
            }));

            match page.next_token {
                Some(token) => request.next_token = Some(token),
                None => break,
            }
        }

        debug!(volume_count = volumes.len(), "Listed eligible volumes");
        Ok(volumes)
    }

    #[instrument(skip(self), fields(delete_after_tag = %self.delete_after_tag))]
    async fn list_candidate_snapshots(&self) -> Result<Vec<Snapshot>> {
        let mut snapshots = Vec::new();
        let mut request = DescribeRequest {
            filters: self.snapshot_filters(),
            next_token: None,
        };

        loop {
            let page = self.control_plane.describe_snapshots(&request).await;
            self.recorder.record(RequestKind::DescribeSnapshots);
            let page = page?;

            snapshots.extend(page.items.into_iter().filter_map(|record| {
                let snapshot = record.into_snapshot();
                if snapshot.is_none() {
                    debug!("Skipping snapshot record without an ID");
                }
                snapshot
            }));

            match page.next_token {
                Some(token) => request.next_token = Some(token),
                None => break,
            }
        }

        debug!(snapshot_count = snapshots.len(), "Listed candidate snapshots");
        Ok(snapshots)
    }

    async fn create_snapshot(&self, volume_id: &VolumeId, description: &str) -> Result<Snapshot> {
        let created = self
            .control_plane
            .create_snapshot(volume_id, description)
            .await;
        self.recorder.record(RequestKind::CreateSnapshot);
        Ok(created?.into_snapshot_unchecked())
    }

    async fn tag_resource(&self, resource_id: &str, tags: &[Tag]) -> Result<()> {
        let tagged = self.control_plane.create_tags(resource_id, tags).await;
        self.recorder.record(RequestKind::CreateTags);
        tagged
    }

    async fn delete_snapshot(&self, snapshot_id: &SnapshotId) -> Result<()> {
        let deleted = self.control_plane.delete_snapshot(snapshot_id).await;
        self.recorder.record(RequestKind::DeleteSnapshot);
        deleted
    }
}
