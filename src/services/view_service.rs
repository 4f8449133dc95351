//! Qualified view recording
//!
//! Views are record-once: clients report engagement freely, but an identity
//! counts at most one view per content item, ever. Qualification is a fixed
//! threshold check; calls below it are accepted and change nothing, so
//! clients never need to pre-filter.
//!
//! The insert-first pattern does the dedup: the first qualifying call lands
//! the row and moves the counter, every later one hits the UNIQUE constraint
//! and only ratchets the stored metrics upward.

use std::sync::Arc;

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::ContentGate;
use crate::content::ContentRef;
use crate::db::models::{CounterField, InteractionKind};
use crate::db::{counters, interactions, with_retry, EngagementDb, RetryPolicy};
use crate::error::{EngagementError, Result};
use crate::identity::Identity;
use crate::services::events::{ChangeEvent, ChangeHub};

// ============================================================================
// Constants
// ============================================================================

/// Watch time at which a view qualifies
pub const MIN_QUALIFYING_DURATION_MS: i64 = 3000;

/// Playback progress at which a view qualifies
pub const MIN_QUALIFYING_PROGRESS_PCT: i32 = 25;

// ============================================================================
// Types
// ============================================================================

/// Engagement reported with a view call
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ViewEngagement {
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub progress_pct: Option<i32>,
    #[serde(default)]
    pub is_complete: bool,
}

impl ViewEngagement {
    pub fn completed() -> Self {
        Self {
            is_complete: true,
            ..Self::default()
        }
    }

    pub fn watched_ms(duration_ms: i64) -> Self {
        Self {
            duration_ms: Some(duration_ms),
            ..Self::default()
        }
    }

    pub fn progressed(progress_pct: i32) -> Self {
        Self {
            progress_pct: Some(progress_pct),
            ..Self::default()
        }
    }
}

/// Result of a view call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewOutcome {
    /// Authoritative post-commit view counter
    pub view_count: i64,
    /// Whether this identity has a counted view of the content
    pub has_viewed: bool,
}

/// View qualification engine
pub struct ViewService {
    db: Arc<EngagementDb>,
    gate: Arc<dyn ContentGate>,
    hub: Arc<ChangeHub>,
    retry: RetryPolicy,
}

impl ViewService {
    pub fn new(
        db: Arc<EngagementDb>,
        gate: Arc<dyn ContentGate>,
        hub: Arc<ChangeHub>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            db,
            gate,
            hub,
            retry,
        }
    }

    /// Record a view, counting it once per identity if it qualifies
    ///
    /// Anonymous session identities are accepted and counted independently
    /// of any user identity on the same device.
    pub fn record_view(
        &self,
        identity: &Identity,
        content: &ContentRef,
        engagement: &ViewEngagement,
    ) -> Result<ViewOutcome> {
        content.validate()?;
        identity.validate()?;
        let identity_key = identity.storage_key();

        let (duration_ms, progress_pct, is_complete) = clamped_metrics(engagement);

        if !qualifies(duration_ms, progress_pct, is_complete) {
            // Below threshold: report current state, touch nothing
            let mut conn = self.db.conn()?;
            let has_viewed =
                interactions::record_exists(&mut conn, &identity_key, content, InteractionKind::View)?;
            let view_count = counters::get_snapshot(&mut conn, content)?.view_count;
            return Ok(ViewOutcome {
                view_count,
                has_viewed,
            });
        }

        let counted = with_retry(&self.retry, || {
            let mut conn = self.db.conn()?;
            self.record_once(
                &mut conn,
                &identity_key,
                content,
                duration_ms,
                progress_pct,
                is_complete,
            )
        })?;

        let view_count = with_retry(&self.retry, || {
            let mut conn = self.db.conn()?;
            counters::get_snapshot(&mut conn, content)
        })?
        .view_count;

        if counted {
            let mut event = ChangeEvent::new(content.clone(), CounterField::View, view_count);
            if let Some(user_id) = identity.user_id() {
                event = event.with_actor(user_id);
            }
            self.hub.publish(event);
        }

        debug!(
            identity = %identity_key,
            content = %content,
            counted = counted,
            view_count = view_count,
            "View recorded"
        );

        Ok(ViewOutcome {
            view_count,
            has_viewed: true,
        })
    }

    /// One qualifying-view attempt inside a write transaction
    ///
    /// Returns true when this call landed the identity's first view row and
    /// moved the counter; false when it only ratcheted an existing row.
    fn record_once(
        &self,
        conn: &mut SqliteConnection,
        identity_key: &str,
        content: &ContentRef,
        duration_ms: Option<i64>,
        progress_pct: Option<i32>,
        is_complete: bool,
    ) -> Result<bool> {
        conn.immediate_transaction(|conn| {
            if !self.gate.exists(conn, content)? {
                return Err(EngagementError::ContentNotFound(content.to_string()));
            }

            let inserted = interactions::insert_view_record(
                conn,
                identity_key,
                content,
                duration_ms,
                progress_pct,
                is_complete,
            )?;
            if inserted {
                counters::bump(conn, content, CounterField::View, 1)?;
            } else {
                interactions::ratchet_view_record(
                    conn,
                    identity_key,
                    content,
                    duration_ms,
                    progress_pct,
                    is_complete,
                )?;
            }
            Ok(inserted)
        })
    }
}

/// Threshold check on already-clamped metrics
fn qualifies(duration_ms: Option<i64>, progress_pct: Option<i32>, is_complete: bool) -> bool {
    is_complete
        || duration_ms.is_some_and(|d| d >= MIN_QUALIFYING_DURATION_MS)
        || progress_pct.is_some_and(|p| p >= MIN_QUALIFYING_PROGRESS_PCT)
}

/// Clamp reported metrics into their valid ranges
fn clamped_metrics(engagement: &ViewEngagement) -> (Option<i64>, Option<i32>, bool) {
    (
        engagement.duration_ms.map(|d| d.max(0)),
        engagement.progress_pct.map(|p| p.clamp(0, 100)),
        engagement.is_complete,
    )
}
