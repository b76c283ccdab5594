//! Resource tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag key holding the human-readable name of a resource.
pub const NAME_TAG: &str = "Name";

/// Tag key under which a snapshot carries its source volume's name.
///
/// Distinct from [`NAME_TAG`] so the copy never collides with the
/// snapshot's own name.
pub const VOLUME_NAME_TAG: &str = "volume-name";

/// A key/value tag on a platform resource.
///
/// The platform may report a tag without a value, so `value` is optional.
/// Tag sets are kept as ordered `Vec<Tag>`: keys are not guaranteed unique
/// and every lookup commits to the first match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value, absent when the platform reported none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Tag {
    /// Creates a tag with a value.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Creates a tag that has a key but no value.
    #[must_use]
    pub fn key_only(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    /// Returns the value as a string slice, if present.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={value}", self.key),
            None => write!(f, "{}", self.key),
        }
    }
}

/// Returns the first tag whose key equals `key` exactly.
#[must_use]
pub fn find_exact<'a>(tags: &'a [Tag], key: &str) -> Option<&'a Tag> {
    tags.iter().find(|tag| tag.key == key)
}

/// Returns the first tag whose key equals `key` ignoring case.
#[must_use]
pub fn find_ignore_case<'a>(tags: &'a [Tag], key: &str) -> Option<&'a Tag> {
    let wanted = key.to_lowercase();
    tags.iter().find(|tag| tag.key.to_lowercase() == wanted)
}
