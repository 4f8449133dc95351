//! Content existence gates
//!
//! The engagement engines never store content; before creating a record they
//! ask a [`ContentGate`] whether the referenced item exists. The gate borrows
//! the live transaction connection, so the check shares the write
//! transaction's view of the database.
//!
//! Dispatch is per content kind through [`KindGateRegistry`]. Catalogs living
//! in the same SQLite file plug in as [`SqlTableGate`]; out-of-process
//! catalogs and tests use [`StaticGate`].

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use diesel::prelude::*;
use diesel::sql_types::Text;
use tracing::warn;

use crate::content::{ContentKind, ContentRef};
use crate::error::{EngagementError, Result};

/// Existence check for referenced content
///
/// Returning `Ok(false)` makes the calling engine abort with
/// `ContentNotFound` before any record is created. Deletions never consult
/// the gate; an existing record proved existence at creation time.
pub trait ContentGate: Send + Sync {
    fn exists(&self, conn: &mut SqliteConnection, content: &ContentRef) -> Result<bool>;
}

// ============================================================================
// Per-Kind Registry
// ============================================================================

/// Routes existence checks to one gate per content kind
///
/// Kinds without a registered gate resolve to not-found. Supporting a new
/// kind means registering one adapter; the engines stay untouched.
#[derive(Default)]
pub struct KindGateRegistry {
    gates: HashMap<ContentKind, Box<dyn ContentGate>>,
}

impl KindGateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the gate for one content kind, replacing any previous one
    pub fn register(mut self, kind: ContentKind, gate: Box<dyn ContentGate>) -> Self {
        self.gates.insert(kind, gate);
        self
    }
}

impl ContentGate for KindGateRegistry {
    fn exists(&self, conn: &mut SqliteConnection, content: &ContentRef) -> Result<bool> {
        match self.gates.get(&content.kind) {
            Some(gate) => gate.exists(conn, content),
            None => {
                warn!("No content gate registered for kind '{}'", content.kind);
                Ok(false)
            }
        }
    }
}

// ============================================================================
// SQL Catalog Gate
// ============================================================================

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    count: i64,
}

/// Gate backed by a catalog table in the same SQLite database
///
/// Identifier names are fixed at construction and validated there; only the
/// content id is ever bound as a parameter.
pub struct SqlTableGate {
    table: String,
    id_column: String,
    active_column: Option<String>,
}

impl SqlTableGate {
    pub fn new(table: &str, id_column: &str) -> Result<Self> {
        validate_sql_identifier(table)?;
        validate_sql_identifier(id_column)?;
        Ok(Self {
            table: table.to_string(),
            id_column: id_column.to_string(),
            active_column: None,
        })
    }

    /// Additionally require a non-zero flag column (soft-deleted rows gate
    /// as not-found)
    pub fn with_active_column(mut self, column: &str) -> Result<Self> {
        validate_sql_identifier(column)?;
        self.active_column = Some(column.to_string());
        Ok(self)
    }
}

impl ContentGate for SqlTableGate {
    fn exists(&self, conn: &mut SqliteConnection, content: &ContentRef) -> Result<bool> {
        let sql = match &self.active_column {
            Some(active) => format!(
                "SELECT COUNT(*) AS count FROM {} WHERE {} = ? AND {} != 0",
                self.table, self.id_column, active
            ),
            None => format!(
                "SELECT COUNT(*) AS count FROM {} WHERE {} = ?",
                self.table, self.id_column
            ),
        };

        let row: CountRow = diesel::sql_query(sql)
            .bind::<Text, _>(&content.id)
            .get_result(conn)
            .map_err(|e| EngagementError::from_diesel("Catalog query failed", e))?;

        Ok(row.count > 0)
    }
}

fn validate_sql_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(EngagementError::Config(format!(
            "Invalid SQL identifier '{}'",
            name
        )));
    }
    Ok(())
}

// ============================================================================
// Static Gate
// ============================================================================

/// In-memory set of known content refs
///
/// For tests and for embedders whose catalog lives out of process and is
/// mirrored into the gate. A panicked writer cannot leave the set
/// half-mutated, so all three accessors recover a poisoned lock instead of
/// surfacing it.
#[derive(Default)]
pub struct StaticGate {
    known: RwLock<HashSet<ContentRef>>,
}

impl StaticGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, content: ContentRef) {
        self.known
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(content);
    }

    pub fn remove(&self, content: &ContentRef) {
        self.known
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(content);
    }
}

impl ContentGate for StaticGate {
    fn exists(&self, _conn: &mut SqliteConnection, content: &ContentRef) -> Result<bool> {
        let known = self.known.read().unwrap_or_else(PoisonError::into_inner);
        Ok(known.contains(content))
    }
}
