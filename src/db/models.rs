//! Diesel model definitions for engagement tables
//!
//! - Queryable structs: for SELECT queries (reading data)
//! - Insertable structs: for INSERT queries (writing data)
//!
//! Kind discriminators are closed enums with stable string forms; the string
//! is what lands in the `kind` column and in serialized events.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::diesel_schema::{counter_aggregates, interaction_records};

// ============================================================================
// Timestamp Helpers (SQLite stores timestamps as TEXT)
// ============================================================================

/// Get current UTC timestamp as ISO 8601 string for SQLite TEXT columns
pub fn current_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

// ============================================================================
// Kind Discriminators
// ============================================================================

/// Interaction kinds stored in `interaction_records.kind`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Like,
    Bookmark,
    View,
}

impl InteractionKind {
    /// Stable string form stored in the `kind` column
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Like => "like",
            InteractionKind::Bookmark => "bookmark",
            InteractionKind::View => "view",
        }
    }

    /// Counter column this kind feeds
    pub fn counter_field(&self) -> CounterField {
        match self {
            InteractionKind::Like => CounterField::Like,
            InteractionKind::Bookmark => CounterField::Bookmark,
            InteractionKind::View => CounterField::View,
        }
    }
}

/// Toggleable subset of interaction kinds
///
/// Views are record-once and never toggled, so they are excluded here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleKind {
    Like,
    Bookmark,
}

impl ToggleKind {
    pub fn as_str(&self) -> &'static str {
        self.as_interaction().as_str()
    }

    pub fn as_interaction(&self) -> InteractionKind {
        match self {
            ToggleKind::Like => InteractionKind::Like,
            ToggleKind::Bookmark => InteractionKind::Bookmark,
        }
    }

    pub fn counter_field(&self) -> CounterField {
        self.as_interaction().counter_field()
    }
}

/// Counter columns on `counter_aggregates`
///
/// Comment and share tallies live here even though comment bodies and share
/// actions are owned elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterField {
    Like,
    Bookmark,
    View,
    Comment,
    Share,
}

impl CounterField {
    /// Column name in `counter_aggregates`
    pub fn column(&self) -> &'static str {
        match self {
            CounterField::Like => "like_count",
            CounterField::Bookmark => "bookmark_count",
            CounterField::View => "view_count",
            CounterField::Comment => "comment_count",
            CounterField::Share => "share_count",
        }
    }
}

// ============================================================================
// Interaction Record Models
// ============================================================================

/// Interaction record row from SELECT query
///
/// The view-only metric columns stay NULL for likes and bookmarks.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = interaction_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct InteractionRecord {
    pub id: String,
    pub identity_key: String,
    pub content_kind: String,
    pub content_id: String,
    pub kind: String,
    pub created_at: String,
    pub duration_ms: Option<i64>,
    pub progress_pct: Option<i32>,
    pub is_complete: i32,
    pub first_viewed_at: Option<String>,
    pub last_viewed_at: Option<String>,
}

impl InteractionRecord {
    pub fn is_complete(&self) -> bool {
        self.is_complete != 0
    }
}

/// New interaction record for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = interaction_records)]
pub struct NewInteractionRecord<'a> {
    pub id: &'a str,
    pub identity_key: &'a str,
    pub content_kind: &'a str,
    pub content_id: &'a str,
    pub kind: &'a str,
    pub created_at: &'a str,
    pub duration_ms: Option<i64>,
    pub progress_pct: Option<i32>,
    pub is_complete: i32,
    pub first_viewed_at: Option<&'a str>,
    pub last_viewed_at: Option<&'a str>,
}

// ============================================================================
// Counter Aggregate Models
// ============================================================================

/// Counter aggregate row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = counter_aggregates)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CounterRow {
    pub content_kind: String,
    pub content_id: String,
    pub like_count: i64,
    pub bookmark_count: i64,
    pub view_count: i64,
    pub comment_count: i64,
    pub share_count: i64,
    pub updated_at: String,
}
