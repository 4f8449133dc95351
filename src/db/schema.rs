//! Database schema definitions

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use tracing::info;

use crate::error::EngagementError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &mut SqliteConnection) -> Result<(), EngagementError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new engagement schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "Migrating engagement schema from v{} to v{}",
            current_version, SCHEMA_VERSION
        );
        migrate_schema(conn, current_version)?;
    }

    Ok(())
}

#[derive(QueryableByName)]
struct VersionRow {
    #[diesel(sql_type = diesel::sql_types::Integer)]
    version: i32,
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &mut SqliteConnection) -> Result<i32, EngagementError> {
    diesel::sql_query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .execute(conn)
        .map_err(|e| EngagementError::from_diesel("Failed to create schema_version table", e))?;

    let row: Option<VersionRow> = diesel::sql_query("SELECT version FROM schema_version LIMIT 1")
        .get_result(conn)
        .optional()
        .map_err(|e| EngagementError::from_diesel("Failed to read schema_version", e))?;

    Ok(row.map(|r| r.version).unwrap_or(0))
}

/// Set schema version
fn set_schema_version(conn: &mut SqliteConnection, version: i32) -> Result<(), EngagementError> {
    diesel::sql_query("DELETE FROM schema_version")
        .execute(conn)
        .map_err(|e| EngagementError::from_diesel("Failed to clear schema_version", e))?;
    diesel::sql_query("INSERT INTO schema_version (version) VALUES (?)")
        .bind::<diesel::sql_types::Integer, _>(version)
        .execute(conn)
        .map_err(|e| EngagementError::from_diesel("Failed to set schema_version", e))?;
    Ok(())
}

/// Create all tables
fn create_tables(conn: &mut SqliteConnection) -> Result<(), EngagementError> {
    conn.batch_execute(ENGAGEMENT_SCHEMA)
        .map_err(|e| EngagementError::from_diesel("Failed to create engagement tables", e))?;

    conn.batch_execute(INDEXES_SCHEMA)
        .map_err(|e| EngagementError::from_diesel("Failed to create indexes", e))?;

    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &mut SqliteConnection, from_version: i32) -> Result<(), EngagementError> {
    // Add migration steps here as schema evolves
    match from_version {
        _ => {}
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Engagement table schema
const ENGAGEMENT_SCHEMA: &str = r#"
-- One row per (identity, content, kind)
-- The UNIQUE key is the idempotency mechanism: concurrent duplicate
-- writes fail closed instead of silently double-counting
CREATE TABLE IF NOT EXISTS interaction_records (
    id TEXT PRIMARY KEY NOT NULL,
    identity_key TEXT NOT NULL,
    content_kind TEXT NOT NULL,
    content_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    created_at TEXT NOT NULL,

    -- View metrics (NULL for likes and bookmarks); ratchet upward only
    duration_ms BIGINT,
    progress_pct INTEGER,
    is_complete INTEGER NOT NULL DEFAULT 0,
    first_viewed_at TEXT,
    last_viewed_at TEXT,

    UNIQUE (identity_key, content_kind, content_id, kind)
);

-- Per-content counters, maintained incrementally alongside record writes
-- Never recomputed from records in the hot path
CREATE TABLE IF NOT EXISTS counter_aggregates (
    content_kind TEXT NOT NULL,
    content_id TEXT NOT NULL,
    like_count BIGINT NOT NULL DEFAULT 0,
    bookmark_count BIGINT NOT NULL DEFAULT 0,
    view_count BIGINT NOT NULL DEFAULT 0,
    comment_count BIGINT NOT NULL DEFAULT 0,
    share_count BIGINT NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (content_kind, content_id)
);
"#;

/// Index definitions for fast queries
const INDEXES_SCHEMA: &str = r#"
-- Record lookups by content (reconciliation, per-content record counts)
CREATE INDEX IF NOT EXISTS idx_interactions_content ON interaction_records(content_kind, content_id, kind);

-- Record lookups by identity (profile views, cleanup)
CREATE INDEX IF NOT EXISTS idx_interactions_identity ON interaction_records(identity_key);
"#;
