//! Tag policy.
//!
//! Pure functions that turn resource tags into decisions: whether a volume
//! is backed up, how long its snapshots live, what a new snapshot is called
//! and tagged with, and whether a snapshot has expired. Nothing here talks
//! to the platform or the ledger.
//!
//! # Key matching
//!
//! Tag keys are matched differently depending on the tag:
//!
//! | Tag | Matching |
//! |-----|----------|
//! | backup | configured spelling or its lowercase form (platform filter) |
//! | retention | ignoring case |
//! | delete-after | exact |
//! | `Name` | exact |

mod expiration;
mod retention;

pub use expiration::{delete_after, format_delete_after, is_expired, parse_delete_after};
pub use retention::{DEFAULT_RETENTION_DAYS, MAX_DEFAULT_RETENTION_DAYS, resolve_retention_days};

use crate::models::{NAME_TAG, Tag, VOLUME_NAME_TAG, VolumeId, find_exact, find_ignore_case};
use chrono::{DateTime, Utc};

/// Separator between the parts of a generated snapshot name.
pub const NAME_DELIMITER: char = '-';

/// Returns `true` if the tags mark the resource for automated backup.
#[must_use]
pub fn is_eligible_for_backup(tags: &[Tag], backup_tag_key: &str) -> bool {
    find_ignore_case(tags, backup_tag_key).is_some()
}

/// Tag-key filter values used to list backup candidates.
///
/// The platform matches tag keys case-sensitively, so the configured key is
/// queried both as written and lowercased.
#[must_use]
pub fn backup_tag_filter_values(backup_tag_key: &str) -> [String; 2] {
    [backup_tag_key.to_string(), backup_tag_key.to_lowercase()]
}

/// Builds a snapshot name unique per run: `<volume>-<unix nanos>-<suffix>`.
#[must_use]
pub fn snapshot_name(volume_id: &VolumeId, created: DateTime<Utc>, suffix: &str) -> String {
    let nanos = created
        .timestamp_nanos_opt()
        .unwrap_or_else(|| created.timestamp_micros().saturating_mul(1_000));
    format!("{volume_id}{NAME_DELIMITER}{nanos}{NAME_DELIMITER}{suffix}")
}

/// Builds the tag set stamped onto a newly created snapshot.
///
/// - `Name`: the generated snapshot name
/// - `delete_after_tag`: the deletion threshold as RFC 3339
/// - `volume-name`: the source volume's `Name`, when it has one
#[must_use]
pub fn snapshot_tags(
    name: &str,
    delete_after_tag: &str,
    delete_after: DateTime<Utc>,
    volume_tags: &[Tag],
) -> Vec<Tag> {
    let mut tags = vec![
        Tag::new(NAME_TAG, name),
        Tag::new(delete_after_tag, format_delete_after(delete_after)),
    ];

    if let Some(volume_name) = find_exact(volume_tags, NAME_TAG) {
        tags.push(Tag {
            key: VOLUME_NAME_TAG.to_string(),
            value: volume_name.value.clone(),
        });
    }

    tags
}
