//! Volumes and snapshots.

use super::Tag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform identifier of a block-storage volume.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeId(String);

impl VolumeId {
    /// Creates a new volume ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VolumeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for VolumeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Platform identifier of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Creates a new snapshot ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the platform handed back an empty identifier.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SnapshotId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SnapshotId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A block-storage volume, owned by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    /// Volume identifier.
    pub id: VolumeId,
    /// Tags in platform order.
    pub tags: Vec<Tag>,
}

impl Volume {
    /// Creates a volume with the given tags.
    #[must_use]
    pub fn new(id: impl Into<VolumeId>, tags: Vec<Tag>) -> Self {
        Self {
            id: id.into(),
            tags,
        }
    }
}

/// A point-in-time copy of a volume.
///
/// Source volume and start time are optional because the platform does not
/// guarantee them on every listing; both are needed to build a ledger key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Snapshot identifier (empty if the platform returned none on create).
    pub id: SnapshotId,
    /// Volume this snapshot was taken from.
    pub volume_id: Option<VolumeId>,
    /// When the platform started the snapshot.
    pub start_time: Option<DateTime<Utc>>,
    /// Tags in platform order.
    pub tags: Vec<Tag>,
}
