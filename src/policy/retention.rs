//! Retention period resolution.
//!
//! The retention period of a snapshot is read from its source volume once,
//! at creation time, and baked into the snapshot's deletion tag. Prune never
//! looks at the volume again.
//!
//! # Resolution rules
//!
//! | Volume tag | Resolved days |
//! |------------|---------------|
//! | absent | default |
//! | `"3"` | 3 |
//! | `"0"` | default |
//! | `""`, `"abc"`, `"-2"` | default (warning logged) |
//!
//! The tag key is compared ignoring case and the first matching tag with a
//! value wins. A matching tag without a value is skipped with a warning and
//! the scan goes on.

use crate::models::Tag;
use tracing::warn;

/// Default retention period in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Largest configurable default retention period in days.
pub const MAX_DEFAULT_RETENTION_DAYS: u32 = 36_500;

/// Resolves the retention period of a volume from its tags.
#[must_use]
pub fn resolve_retention_days(tags: &[Tag], retention_tag_key: &str, default_days: u32) -> u32 {
    let wanted = retention_tag_key.to_lowercase();
    let mut days = 0;

    for tag in tags {
        if tag.key.to_lowercase() != wanted {
            continue;
        }
        let Some(value) = tag.value() else {
            warn!(tag = %tag.key, "Retention tag value is missing");
            continue;
        };
        days = match value.parse::<u32>() {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(
                    tag = %tag.key,
                    value,
                    error = %e,
                    "Couldn't parse retention days, falling back to default"
                );
                default_days
            },
        };
        break;
    }

    if days == 0 { default_days } else { days }
}
