//! Content references - typed (kind, id) pointers into the catalog
//!
//! The engagement core never owns content. A `ContentRef` is the lookup key
//! used across records, counters, and change topics; the catalog owns the
//! referent and answers existence through the gate adapters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngagementError;

/// Maximum identifier length accepted from callers
pub const MAX_IDENTIFIER_LEN: usize = 255;

/// Content kinds known to the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Media,
    ForumPost,
    Prayer,
    Devotional,
    Artist,
    Merch,
}

impl ContentKind {
    pub const ALL: [ContentKind; 6] = [
        ContentKind::Media,
        ContentKind::ForumPost,
        ContentKind::Prayer,
        ContentKind::Devotional,
        ContentKind::Artist,
        ContentKind::Merch,
    ];

    /// Stable string form used in storage and topic keys
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Media => "media",
            ContentKind::ForumPost => "forum_post",
            ContentKind::Prayer => "prayer",
            ContentKind::Devotional => "devotional",
            ContentKind::Artist => "artist",
            ContentKind::Merch => "merch",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = EngagementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "media" => Ok(ContentKind::Media),
            "forum_post" => Ok(ContentKind::ForumPost),
            "prayer" => Ok(ContentKind::Prayer),
            "devotional" => Ok(ContentKind::Devotional),
            "artist" => Ok(ContentKind::Artist),
            "merch" => Ok(ContentKind::Merch),
            other => Err(EngagementError::InvalidReference(format!(
                "Unknown content kind: {}",
                other
            ))),
        }
    }
}

/// Reference to one catalog item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRef {
    pub kind: ContentKind,
    pub id: String,
}

impl ContentRef {
    pub fn new(kind: ContentKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Check the id is well-formed before it reaches storage
    pub fn validate(&self) -> Result<(), EngagementError> {
        validate_identifier(&self.id, "content id")
    }

    /// Key for per-content change subscriptions
    pub fn topic_key(&self) -> String {
        format!("{}/{}", self.kind.as_str(), self.id)
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.as_str(), self.id)
    }
}

/// Shared identifier validation for content ids and identity keys
pub(crate) fn validate_identifier(value: &str, what: &str) -> Result<(), EngagementError> {
    if value.is_empty() {
        return Err(EngagementError::InvalidReference(format!(
            "{} must not be empty",
            what
        )));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(EngagementError::InvalidReference(format!(
            "{} must be <= {} characters",
            what, MAX_IDENTIFIER_LEN
        )));
    }
    if value.trim() != value {
        return Err(EngagementError::InvalidReference(format!(
            "{} must not have surrounding whitespace",
            what
        )));
    }
    if value.chars().any(|c| c.is_control()) {
        return Err(EngagementError::InvalidReference(format!(
            "{} must not contain control characters",
            what
        )));
    }
    Ok(())
}
