//! Counter aggregate operations
//!
//! One row per content item carrying the five counters. All writes go
//! through [`bump`], a single conflict-handled upsert that clamps at zero,
//! and only the toggle/view/counter services call it. Reads come back as
//! [`CounterSnapshot`], zero-filled when no row exists yet.

use std::collections::HashMap;

use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use serde::{Deserialize, Serialize};

use super::diesel_schema::counter_aggregates;
use super::models::{current_timestamp, CounterField, CounterRow};
use crate::content::ContentRef;
use crate::error::{EngagementError, Result};

// ============================================================================
// Snapshot Type
// ============================================================================

/// Point-in-time counter values for one content item
///
/// Absent rows read as all-zero, so callers never distinguish "no row yet"
/// from "row of zeros".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub like_count: i64,
    pub bookmark_count: i64,
    pub view_count: i64,
    pub comment_count: i64,
    pub share_count: i64,
}

impl CounterSnapshot {
    pub fn get(&self, field: CounterField) -> i64 {
        match field {
            CounterField::Like => self.like_count,
            CounterField::Bookmark => self.bookmark_count,
            CounterField::View => self.view_count,
            CounterField::Comment => self.comment_count,
            CounterField::Share => self.share_count,
        }
    }
}

impl From<CounterRow> for CounterSnapshot {
    fn from(row: CounterRow) -> Self {
        Self {
            like_count: row.like_count,
            bookmark_count: row.bookmark_count,
            view_count: row.view_count,
            comment_count: row.comment_count,
            share_count: row.share_count,
        }
    }
}

// ============================================================================
// Read Operations
// ============================================================================

/// Get the raw counter row for one content item, if present
pub fn get_counters(
    conn: &mut SqliteConnection,
    content: &ContentRef,
) -> Result<Option<CounterRow>> {
    counter_aggregates::table
        .filter(counter_aggregates::content_kind.eq(content.kind.as_str()))
        .filter(counter_aggregates::content_id.eq(content.id.as_str()))
        .select(CounterRow::as_select())
        .first(conn)
        .optional()
        .map_err(|e| EngagementError::from_diesel("Query failed", e))
}

/// Get the counter snapshot for one content item, zero-filled when absent
pub fn get_snapshot(conn: &mut SqliteConnection, content: &ContentRef) -> Result<CounterSnapshot> {
    Ok(get_counters(conn, content)?
        .map(CounterSnapshot::from)
        .unwrap_or_default())
}

/// Get counter snapshots for many content items in one pass
///
/// Requests are deduplicated, rows are fetched with one query per content
/// kind, and every requested item appears in the result (zero-filled when
/// no row exists).
pub fn get_snapshot_batch(
    conn: &mut SqliteConnection,
    contents: &[ContentRef],
) -> Result<HashMap<ContentRef, CounterSnapshot>> {
    let mut result: HashMap<ContentRef, CounterSnapshot> = HashMap::new();
    let mut ids_by_kind: HashMap<&'static str, Vec<&str>> = HashMap::new();

    for content in contents {
        if result
            .insert(content.clone(), CounterSnapshot::default())
            .is_none()
        {
            ids_by_kind
                .entry(content.kind.as_str())
                .or_default()
                .push(content.id.as_str());
        }
    }

    let mut found: HashMap<(String, String), CounterSnapshot> = HashMap::new();
    for (kind, ids) in ids_by_kind {
        let rows: Vec<CounterRow> = counter_aggregates::table
            .filter(counter_aggregates::content_kind.eq(kind))
            .filter(counter_aggregates::content_id.eq_any(ids))
            .select(CounterRow::as_select())
            .load(conn)
            .map_err(|e| EngagementError::from_diesel("Query failed", e))?;

        for row in rows {
            found.insert(
                (row.content_kind.clone(), row.content_id.clone()),
                CounterSnapshot::from(row),
            );
        }
    }

    for (content, snapshot) in result.iter_mut() {
        if let Some(values) = found.get(&(content.kind.as_str().to_string(), content.id.clone())) {
            *snapshot = *values;
        }
    }

    Ok(result)
}

// ============================================================================
// Write Operations
// ============================================================================

/// Apply a delta to one counter column, creating the row on first touch
///
/// Single upsert; `MAX(0, ...)` keeps counters non-negative even if a
/// decrement arrives against a missing or zero row. The column name comes
/// from the closed [`CounterField`] enum, never from caller input.
/// Crate-private: the engines are the only counter writers.
pub(crate) fn bump(
    conn: &mut SqliteConnection,
    content: &ContentRef,
    field: CounterField,
    delta: i64,
) -> Result<()> {
    let column = field.column();
    let now = current_timestamp();

    diesel::sql_query(format!(
        "INSERT INTO counter_aggregates (content_kind, content_id, {column}, updated_at)
         VALUES (?, ?, MAX(0, ?), ?)
         ON CONFLICT(content_kind, content_id) DO UPDATE SET
             {column} = MAX(0, {column} + ?),
             updated_at = excluded.updated_at"
    ))
    .bind::<Text, _>(content.kind.as_str())
    .bind::<Text, _>(&content.id)
    .bind::<BigInt, _>(delta)
    .bind::<Text, _>(&now)
    .bind::<BigInt, _>(delta)
    .execute(conn)
    .map_err(|e| EngagementError::from_diesel("Update failed", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentKind;
    use crate::db::schema::init_schema;

    fn setup_test_db() -> SqliteConnection {
        let mut conn = SqliteConnection::establish(":memory:").expect("in-memory db");
        init_schema(&mut conn).expect("schema init");
        conn
    }

    fn media(id: &str) -> ContentRef {
        ContentRef::new(ContentKind::Media, id)
    }

    #[test]
    fn test_bump_creates_row_and_accumulates() {
        let mut conn = setup_test_db();
        let content = media("m1");

        bump(&mut conn, &content, CounterField::Like, 1).unwrap();
        bump(&mut conn, &content, CounterField::Like, 1).unwrap();
        bump(&mut conn, &content, CounterField::View, 1).unwrap();

        let snapshot = get_snapshot(&mut conn, &content).unwrap();
        assert_eq!(snapshot.like_count, 2);
        assert_eq!(snapshot.view_count, 1);
        assert_eq!(snapshot.bookmark_count, 0);
        assert_eq!(snapshot.get(CounterField::Like), 2);
    }

    #[test]
    fn test_bump_clamps_at_zero() {
        let mut conn = setup_test_db();
        let content = media("m1");

        // Decrement against a missing row creates it at zero
        bump(&mut conn, &content, CounterField::Bookmark, -1).unwrap();
        assert_eq!(get_snapshot(&mut conn, &content).unwrap().bookmark_count, 0);

        bump(&mut conn, &content, CounterField::Bookmark, 2).unwrap();
        bump(&mut conn, &content, CounterField::Bookmark, -5).unwrap();
        assert_eq!(get_snapshot(&mut conn, &content).unwrap().bookmark_count, 0);
    }

    #[test]
    fn test_snapshot_zero_filled_when_absent() {
        let mut conn = setup_test_db();

        let snapshot = get_snapshot(&mut conn, &media("never-touched")).unwrap();
        assert_eq!(snapshot, CounterSnapshot::default());
        assert!(get_counters(&mut conn, &media("never-touched")).unwrap().is_none());
    }

    #[test]
    fn test_batch_returns_exactly_requested_entries() {
        let mut conn = setup_test_db();
        let a = media("a");
        let b = ContentRef::new(ContentKind::ForumPost, "b");
        let c = media("c");

        bump(&mut conn, &a, CounterField::Like, 3).unwrap();
        bump(&mut conn, &b, CounterField::Comment, 7).unwrap();
        // An unrelated row that must not leak into the result
        bump(&mut conn, &media("other"), CounterField::Like, 9).unwrap();

        let request = vec![a.clone(), b.clone(), c.clone(), a.clone()];
        let batch = get_snapshot_batch(&mut conn, &request).unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch[&a].like_count, 3);
        assert_eq!(batch[&b].comment_count, 7);
        assert_eq!(batch[&c], CounterSnapshot::default());
    }

    #[test]
    fn test_batch_empty_request() {
        let mut conn = setup_test_db();
        let batch = get_snapshot_batch(&mut conn, &[]).unwrap();
        assert!(batch.is_empty());
    }
}
