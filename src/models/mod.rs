//! Data models for autosnap.
//!
//! Volumes and snapshots as the snapshot manager sees them, after the
//! gateway has dropped malformed platform records.

mod resource;
mod tag;

pub use resource::{Snapshot, SnapshotId, Volume, VolumeId};
pub use tag::{NAME_TAG, Tag, VOLUME_NAME_TAG, find_exact, find_ignore_case};
