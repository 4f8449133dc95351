//! Interaction record operations
//!
//! One row per (identity, content, kind). The UNIQUE constraint on that
//! quad is the idempotency mechanism: writers use `INSERT OR IGNORE` and
//! rows-affected checks rather than read-then-write locking, so concurrent
//! duplicate calls resolve instead of double-counting.
//!
//! Like and bookmark rows are deleted on toggle-off; row existence is the
//! boolean state. View rows are never deleted and their metrics only move
//! upward.

use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer, Text};
use uuid::Uuid;

use super::diesel_schema::interaction_records;
use super::models::{
    current_timestamp, InteractionKind, InteractionRecord, NewInteractionRecord, ToggleKind,
};
use crate::content::ContentRef;
use crate::error::{EngagementError, Result};

// ============================================================================
// Read Operations
// ============================================================================

/// Get the record for one (identity, content, kind), if present
pub fn get_record(
    conn: &mut SqliteConnection,
    identity_key: &str,
    content: &ContentRef,
    kind: InteractionKind,
) -> Result<Option<InteractionRecord>> {
    interaction_records::table
        .filter(interaction_records::identity_key.eq(identity_key))
        .filter(interaction_records::content_kind.eq(content.kind.as_str()))
        .filter(interaction_records::content_id.eq(content.id.as_str()))
        .filter(interaction_records::kind.eq(kind.as_str()))
        .select(InteractionRecord::as_select())
        .first(conn)
        .optional()
        .map_err(|e| EngagementError::from_diesel("Query failed", e))
}

/// Check whether a record exists for one (identity, content, kind)
pub fn record_exists(
    conn: &mut SqliteConnection,
    identity_key: &str,
    content: &ContentRef,
    kind: InteractionKind,
) -> Result<bool> {
    let found: Option<String> = interaction_records::table
        .filter(interaction_records::identity_key.eq(identity_key))
        .filter(interaction_records::content_kind.eq(content.kind.as_str()))
        .filter(interaction_records::content_id.eq(content.id.as_str()))
        .filter(interaction_records::kind.eq(kind.as_str()))
        .select(interaction_records::id)
        .first(conn)
        .optional()
        .map_err(|e| EngagementError::from_diesel("Query failed", e))?;

    Ok(found.is_some())
}

/// Count records of one kind against one content item
///
/// Audit helper: after any committed transaction this must equal the
/// corresponding counter column.
pub fn records_for_content(
    conn: &mut SqliteConnection,
    content: &ContentRef,
    kind: InteractionKind,
) -> Result<i64> {
    interaction_records::table
        .filter(interaction_records::content_kind.eq(content.kind.as_str()))
        .filter(interaction_records::content_id.eq(content.id.as_str()))
        .filter(interaction_records::kind.eq(kind.as_str()))
        .count()
        .get_result(conn)
        .map_err(|e| EngagementError::from_diesel("Count query failed", e))
}

// ============================================================================
// Toggle Writes (like / bookmark)
// ============================================================================

/// Insert a toggle record, ignoring an existing one
///
/// Returns true when a row was actually inserted. False means a concurrent
/// call on the same key won the insert.
pub(crate) fn insert_toggle_record(
    conn: &mut SqliteConnection,
    identity_key: &str,
    content: &ContentRef,
    kind: ToggleKind,
) -> Result<bool> {
    let record_id = Uuid::new_v4().to_string();
    let now = current_timestamp();

    let new_record = NewInteractionRecord {
        id: &record_id,
        identity_key,
        content_kind: content.kind.as_str(),
        content_id: &content.id,
        kind: kind.as_str(),
        created_at: &now,
        duration_ms: None,
        progress_pct: None,
        is_complete: 0,
        first_viewed_at: None,
        last_viewed_at: None,
    };

    let rows = diesel::insert_or_ignore_into(interaction_records::table)
        .values(&new_record)
        .execute(conn)
        .map_err(|e| EngagementError::from_diesel("Insert failed", e))?;

    Ok(rows > 0)
}

/// Delete a toggle record
///
/// Returns true when a row was actually deleted. False means a concurrent
/// call already removed it.
pub(crate) fn delete_toggle_record(
    conn: &mut SqliteConnection,
    identity_key: &str,
    content: &ContentRef,
    kind: ToggleKind,
) -> Result<bool> {
    let rows = diesel::delete(
        interaction_records::table
            .filter(interaction_records::identity_key.eq(identity_key))
            .filter(interaction_records::content_kind.eq(content.kind.as_str()))
            .filter(interaction_records::content_id.eq(content.id.as_str()))
            .filter(interaction_records::kind.eq(kind.as_str())),
    )
    .execute(conn)
    .map_err(|e| EngagementError::from_diesel("Delete failed", e))?;

    Ok(rows > 0)
}

// ============================================================================
// View Writes (record-once, ratcheting)
// ============================================================================

/// Insert a view record with its initial metrics, ignoring an existing one
///
/// Returns true when this identity's first view row landed. False means a
/// row already exists and the caller should ratchet it instead.
pub(crate) fn insert_view_record(
    conn: &mut SqliteConnection,
    identity_key: &str,
    content: &ContentRef,
    duration_ms: Option<i64>,
    progress_pct: Option<i32>,
    is_complete: bool,
) -> Result<bool> {
    let record_id = Uuid::new_v4().to_string();
    let now = current_timestamp();

    let new_record = NewInteractionRecord {
        id: &record_id,
        identity_key,
        content_kind: content.kind.as_str(),
        content_id: &content.id,
        kind: InteractionKind::View.as_str(),
        created_at: &now,
        duration_ms,
        progress_pct,
        is_complete: is_complete as i32,
        first_viewed_at: Some(&now),
        last_viewed_at: Some(&now),
    };

    let rows = diesel::insert_or_ignore_into(interaction_records::table)
        .values(&new_record)
        .execute(conn)
        .map_err(|e| EngagementError::from_diesel("Insert failed", e))?;

    Ok(rows > 0)
}

/// Ratchet an existing view record's metrics upward
///
/// One UPDATE keeps the max of stored and reported duration/progress, keeps
/// is_complete sticky once set, and refreshes last_viewed_at. first_viewed_at
/// and the counter are untouched.
pub(crate) fn ratchet_view_record(
    conn: &mut SqliteConnection,
    identity_key: &str,
    content: &ContentRef,
    duration_ms: Option<i64>,
    progress_pct: Option<i32>,
    is_complete: bool,
) -> Result<()> {
    let now = current_timestamp();

    diesel::sql_query(
        "UPDATE interaction_records
         SET duration_ms = MAX(COALESCE(duration_ms, 0), ?),
             progress_pct = MAX(COALESCE(progress_pct, 0), ?),
             is_complete = MAX(is_complete, ?),
             last_viewed_at = ?
         WHERE identity_key = ? AND content_kind = ? AND content_id = ? AND kind = 'view'",
    )
    .bind::<BigInt, _>(duration_ms.unwrap_or(0))
    .bind::<Integer, _>(progress_pct.unwrap_or(0))
    .bind::<Integer, _>(is_complete as i32)
    .bind::<Text, _>(&now)
    .bind::<Text, _>(identity_key)
    .bind::<Text, _>(content.kind.as_str())
    .bind::<Text, _>(&content.id)
    .execute(conn)
    .map_err(|e| EngagementError::from_diesel("Update failed", e))?;

    Ok(())
}
