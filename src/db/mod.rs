//! SQLite storage for engagement state
//!
//! ## Architecture
//!
//! - One r2d2 pool over a WAL-mode SQLite database
//! - Write paths run inside `immediate_transaction` on a pooled connection
//! - Contention surfaces as busy errors, classified retryable and handled
//!   by [`with_retry`]
//!
//! ## Tables
//!
//! - `interaction_records` - one row per (identity, content, kind)
//! - `counter_aggregates` - per-content counters
//! - `schema_version` - migration bookkeeping

pub mod counters;
pub mod diesel_schema;
pub mod interactions;
pub mod models;
pub mod schema;

use std::time::{Duration, Instant};

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use tracing::{debug, info};

use crate::config::EngagementConfig;
use crate::error::{EngagementError, Result};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Connection tuning applied to every pooled connection
///
/// WAL keeps readers off the writer's lock; busy_timeout makes writers queue
/// instead of failing instantly when they collide.
#[derive(Debug, Clone)]
struct ConnectionTuning {
    busy_timeout_ms: u32,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionTuning {
    fn on_acquire(
        &self,
        conn: &mut SqliteConnection,
    ) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; \
             PRAGMA journal_mode = WAL; \
             PRAGMA synchronous = NORMAL; \
             PRAGMA foreign_keys = ON;",
            self.busy_timeout_ms
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Engagement database handle over a connection pool
pub struct EngagementDb {
    pool: DbPool,
}

impl EngagementDb {
    /// Open or create the engagement database under the configured data dir
    pub fn open(config: &EngagementConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let db_path = config.db_path();
        info!("Opening engagement database at {:?}", db_path);

        let database_url = db_path.to_string_lossy().to_string();
        Self::build(&database_url, config.pool_size, config.busy_timeout_ms)
    }

    /// Open an in-memory database (for testing)
    ///
    /// In-memory SQLite databases are per-connection, so the pool is capped
    /// at a single connection.
    pub fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory engagement database");
        Self::build(":memory:", 1, 5000)
    }

    fn build(database_url: &str, pool_size: u32, busy_timeout_ms: u32) -> Result<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_customizer(Box::new(ConnectionTuning { busy_timeout_ms }))
            .build(manager)
            .map_err(|e| EngagementError::Database(format!("Failed to build pool: {}", e)))?;

        let db = Self { pool };
        let mut conn = db.conn()?;
        schema::init_schema(&mut conn)?;
        drop(conn);

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        self.pool
            .get()
            .map_err(|e| EngagementError::Unavailable(format!("Connection pool exhausted: {}", e)))
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let mut conn = self.conn()?;

        let interaction_count: i64 = diesel_schema::interaction_records::table
            .count()
            .get_result(&mut conn)
            .map_err(|e| EngagementError::from_diesel("Count query failed", e))?;

        let counter_rows: i64 = diesel_schema::counter_aggregates::table
            .count()
            .get_result(&mut conn)
            .map_err(|e| EngagementError::from_diesel("Count query failed", e))?;

        Ok(DbStats {
            interaction_count: interaction_count as u64,
            counter_rows: counter_rows as u64,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub interaction_count: u64,
    pub counter_rows: u64,
}

// ============================================================================
// Retry Plumbing
// ============================================================================

/// Bounded retry policy for transient storage contention
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts before the contention error is surfaced
    pub attempts: u32,
    /// Base pause between attempts; grows linearly per attempt
    pub backoff: Duration,
    /// Overall cap across attempts and pauses
    pub deadline: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EngagementConfig) -> Self {
        Self {
            attempts: config.retry_attempts.max(1),
            backoff: Duration::from_millis(config.retry_backoff_ms),
            deadline: Duration::from_millis(config.op_deadline_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(25),
            deadline: Duration::from_millis(5000),
        }
    }
}

/// Run `op`, retrying transient contention up to the policy bound
///
/// Terminal errors propagate immediately. The last contention error is
/// surfaced unchanged once attempts or the deadline run out.
pub fn with_retry<T, F>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let started = Instant::now();
    let mut attempt = 1u32;

    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                if attempt >= policy.attempts {
                    debug!(attempts = attempt, "Retry budget exhausted: {}", e);
                    return Err(e);
                }
                if started.elapsed() >= policy.deadline {
                    debug!(
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Retry deadline exceeded: {}", e
                    );
                    return Err(e);
                }

                let pause = policy.backoff * attempt;
                debug!(
                    attempt = attempt,
                    pause_ms = pause.as_millis() as u64,
                    "Retrying after contention: {}",
                    e
                );
                std::thread::sleep(pause);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// Re-exports
pub use counters::CounterSnapshot;
pub use models::{CounterField, CounterRow, InteractionKind, InteractionRecord, ToggleKind};
