//! Control-plane request surface.
//!
//! One method per platform request. Records mirror what the platform
//! returns, including fields it may leave out; the gateway is responsible
//! for dropping or normalizing malformed records.

use crate::Result;
use crate::models::{Snapshot, SnapshotId, Tag, Volume, VolumeId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Filter name matching resources that carry any of the given tag keys.
pub const TAG_KEY_FILTER: &str = "tag-key";

/// A describe filter: a resource matches if it matches any of `values`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    /// Filter name, e.g. [`TAG_KEY_FILTER`].
    pub name: String,
    /// Accepted values.
    pub values: Vec<String>,
}

impl Filter {
    /// Creates a `tag-key` filter.
    #[must_use]
    pub fn tag_key<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: TAG_KEY_FILTER.to_string(),
            values: keys.into_iter().map(Into::into).collect(),
        }
    }
}

/// One page request of a describe call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescribeRequest {
    /// Filters, all of which must match.
    pub filters: Vec<Filter>,
    /// Continuation token from the previous page.
    pub next_token: Option<String>,
}

/// One page of a describe response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Records on this page, in platform order.
    pub items: Vec<T>,
    /// Token for the next page; `None` on the last page.
    pub next_token: Option<String>,
}

/// A volume as reported by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRecord {
    /// Volume identifier.
    #[serde(default)]
    pub volume_id: Option<String>,
    /// Volume tags.
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl VolumeRecord {
    /// Converts the record into a [`Volume`], or `None` if it has no ID.
    #[must_use]
    pub fn into_volume(self) -> Option<Volume> {
        let id = self.volume_id.filter(|id| !id.is_empty())?;
        Some(Volume::new(VolumeId::new(id), self.tags))
    }
}

/// A snapshot as reported by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Snapshot identifier.
    #[serde(default)]
    pub snapshot_id: Option<String>,
    /// Source volume identifier.
    #[serde(default)]
    pub volume_id: Option<String>,
    /// When the snapshot was started.
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Free-form description given at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Snapshot tags.
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl SnapshotRecord {
    /// Converts a listed record into a [`Snapshot`], or `None` if it has no ID.
    #[must_use]
    pub fn into_snapshot(self) -> Option<Snapshot> {
        if self.snapshot_id.as_deref().is_none_or(str::is_empty) {
            return None;
        }
        Some(self.into_snapshot_unchecked())
    }

    /// Converts the record keeping a missing ID as an empty [`SnapshotId`].
    #[must_use]
    pub fn into_snapshot_unchecked(self) -> Snapshot {
        Snapshot {
            id: SnapshotId::new(self.snapshot_id.unwrap_or_default()),
            volume_id: self.volume_id.map(VolumeId::new),
            start_time: self.start_time,
            tags: self.tags,
        }
    }
}

/// The platform's block-storage API.
///
/// Implementations return [`crate::Error::Platform`] for every rejected or
/// failed request and must not retry internally.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Returns one page of volumes matching the request's filters.
    async fn describe_volumes(&self, request: &DescribeRequest) -> Result<Page<VolumeRecord>>;

    /// Returns one page of snapshots matching the request's filters.
    async fn describe_snapshots(&self, request: &DescribeRequest)
    -> Result<Page<SnapshotRecord>>;

    /// Starts a snapshot of `volume_id`.
    async fn create_snapshot(
        &self,
        volume_id: &VolumeId,
        description: &str,
    ) -> Result<SnapshotRecord>;

    /// Adds or overwrites tags on a resource.
    async fn create_tags(&self, resource_id: &str, tags: &[Tag]) -> Result<()>;

    /// Deletes a snapshot.
    async fn delete_snapshot(&self, snapshot_id: &SnapshotId) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_record_without_id_is_dropped() {
        assert!(VolumeRecord::default().into_volume().is_none());
        let record = VolumeRecord {
            volume_id: Some(String::new()),
            tags: vec![],
        };
        assert!(record.into_volume().is_none());
    }

    #[test]
    fn test_snapshot_record_conversion() {
        let record = SnapshotRecord {
            snapshot_id: Some("snap-1".to_string()),
            volume_id: Some("vol-1".to_string()),
            ..Default::default()
        };
        let snapshot = record.into_snapshot().expect("has id");
        assert_eq!(snapshot.id.as_str(), "snap-1");
        assert_eq!(snapshot.volume_id, Some(VolumeId::new("vol-1")));

        assert!(SnapshotRecord::default().into_snapshot().is_none());
        assert!(
            SnapshotRecord::default()
                .into_snapshot_unchecked()
                .id
                .is_empty()
        );
    }

    #[test]
    fn test_tag_key_filter() {
        let filter = Filter::tag_key(["Backup", "backup"]);
        assert_eq!(filter.name, TAG_KEY_FILTER);
        assert_eq!(filter.values, vec!["Backup", "backup"]);
    }

    #[test]
    fn test_snapshot_record_json_roundtrip_fields() {
        let json = r#"{"snapshot_id":"snap-9","volume_id":"vol-1","start_time":"2026-10-01T10:00:42Z","tags":[{"key":"_DELETE_AFTER","value":"2026-10-08T10:00:00Z"}]}"#;
        let record: SnapshotRecord = serde_json::from_str(json).expect("parse");
        assert_eq!(record.snapshot_id.as_deref(), Some("snap-9"));
        assert!(record.start_time.is_some());
        assert_eq!(record.tags.len(), 1);
    }
}
