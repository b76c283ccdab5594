//! Deletion-eligibility timestamps.
//!
//! A snapshot created by autosnap carries its deletion threshold as RFC 3339
//! text under the delete-after tag. Deletion is boundary-inclusive: a
//! snapshot is expired as soon as the current instant is not strictly before
//! the threshold.

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};

/// Returns the instant after which a snapshot created at `now` may be deleted.
///
/// Returns `None` when the deadline falls outside the representable range.
#[must_use]
pub fn delete_after(now: DateTime<Utc>, retention_days: u32) -> Option<DateTime<Utc>> {
    now.checked_add_signed(TimeDelta::try_days(i64::from(retention_days))?)
}

/// Returns `true` once `now` has reached `delete_after`.
#[must_use]
pub fn is_expired(delete_after: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= delete_after
}

/// Formats a deletion threshold for the delete-after tag.
///
/// Whole seconds, UTC, `Z` suffix: `2026-10-25T08:30:00Z`.
#[must_use]
pub fn format_delete_after(delete_after: DateTime<Utc>) -> String {
    delete_after.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses a delete-after tag value.
///
/// Any RFC 3339 offset is accepted and normalized to UTC.
pub fn parse_delete_after(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|parsed| parsed.with_timezone(&Utc))
}
