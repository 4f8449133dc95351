//! Counter reads and ancillary tallies
//!
//! Read side of the counter store plus the two tallies that arrive from
//! outside the toggle/view engines: shares (fire-per-call, no dedup) and the
//! comment count maintained for the comment collaborator. Comment callbacks
//! are trusted; the collaborator verified the content when the comment was
//! written, so they skip the gate.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::catalog::ContentGate;
use crate::content::ContentRef;
use crate::db::models::CounterField;
use crate::db::{counters, with_retry, CounterSnapshot, EngagementDb, RetryPolicy};
use crate::error::{EngagementError, Result};
use crate::identity::Identity;
use crate::services::events::{ChangeEvent, ChangeHub};

/// Counter access for content surfaces
pub struct CounterService {
    db: Arc<EngagementDb>,
    gate: Arc<dyn ContentGate>,
    hub: Arc<ChangeHub>,
    retry: RetryPolicy,
}

impl CounterService {
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

    // ========================================================================
    // Reads
    // ========================================================================

    /// Get the counters for one content item, zero-filled when untouched
    pub fn counts(&self, content: &ContentRef) -> Result<CounterSnapshot> {
        content.validate()?;
        let mut conn = self.db.conn()?;
        counters::get_snapshot(&mut conn, content)
    }

    /// Get counters for a whole surface of content items in one pass
    pub fn counts_batch(
        &self,
        contents: &[ContentRef],
    ) -> Result<HashMap<ContentRef, CounterSnapshot>> {
        for content in contents {
            content.validate()?;
        }
        let mut conn = self.db.conn()?;
        counters::get_snapshot_batch(&mut conn, contents)
    }

    // ========================================================================
    // Share Tally
    // ========================================================================

    /// Count one share action against existing content
    ///
    /// Shares are not deduplicated; every call moves the counter. Anonymous
    /// identities are accepted.
    pub fn record_share(&self, identity: &Identity, content: &ContentRef) -> Result<i64> {
        content.validate()?;
        identity.validate()?;

        with_retry(&self.retry, || {
            let mut conn = self.db.conn()?;
            conn.immediate_transaction(|conn| {
                if !self.gate.exists(conn, content)? {
                    return Err(EngagementError::ContentNotFound(content.to_string()));
                }
                counters::bump(conn, content, CounterField::Share, 1)
            })
        })?;

        let count = with_retry(&self.retry, || {
            let mut conn = self.db.conn()?;
            counters::get_snapshot(&mut conn, content)
        })?
        .share_count;

        let mut event = ChangeEvent::new(content.clone(), CounterField::Share, count);
        if let Some(user_id) = identity.user_id() {
            event = event.with_actor(user_id);
        }
        self.hub.publish(event);

        debug!(content = %content, share_count = count, "Share recorded");
        Ok(count)
    }

    // ========================================================================
    // Comment Tally
    // ========================================================================

    /// Record that the comment collaborator added a comment
    pub fn note_comment_added(&self, content: &ContentRef) -> Result<i64> {
        self.adjust_comment(content, 1)
    }

    /// Record that the comment collaborator removed a comment
    pub fn note_comment_removed(&self, content: &ContentRef) -> Result<i64> {
        self.adjust_comment(content, -1)
    }

    fn adjust_comment(&self, content: &ContentRef, delta: i64) -> Result<i64> {
        content.validate()?;

        let changed = with_retry(&self.retry, || {
            let mut conn = self.db.conn()?;
            conn.immediate_transaction(|conn| {
                // Removals against an already-zero tally are ignored rather
                // than clamped into a phantom change
                let current = counters::get_snapshot(conn, content)?.comment_count;
                if delta < 0 && current == 0 {
                    return Ok(false);
                }
                counters::bump(conn, content, CounterField::Comment, delta)?;
                Ok(true)
            })
        })?;

        let count = with_retry(&self.retry, || {
            let mut conn = self.db.conn()?;
            counters::get_snapshot(&mut conn, content)
        })?
        .comment_count;

        if changed {
            self.hub
                .publish(ChangeEvent::new(content.clone(), CounterField::Comment, count));
        }

        debug!(content = %content, comment_count = count, "Comment tally adjusted");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticGate;
    use crate::content::ContentKind;
    use tokio::sync::broadcast::error::TryRecvError;

    fn media(id: &str) -> ContentRef {
        ContentRef::new(ContentKind::Media, id)
    }

    fn setup() -> (CounterService, Arc<ChangeHub>) {
        let db = Arc::new(EngagementDb::open_in_memory().expect("db"));
        let gate = Arc::new(StaticGate::new());
        gate.insert(media("m1"));
        let hub = Arc::new(ChangeHub::new());
        let service = CounterService::new(db, gate, hub.clone(), RetryPolicy::default());
        (service, hub)
    }

    #[test]
    fn test_counts_zero_filled_for_untouched_content() {
        let (service, _hub) = setup();
        let snapshot = service.counts(&media("unseen")).unwrap();
        assert_eq!(snapshot, CounterSnapshot::default());
    }

    #[test]
    fn test_share_tally_has_no_dedup() {
        let (service, _hub) = setup();
        let content = media("m1");

        assert_eq!(service.record_share(&Identity::user("u1"), &content).unwrap(), 1);
        assert_eq!(service.record_share(&Identity::user("u1"), &content).unwrap(), 2);
        assert_eq!(
            service.record_share(&Identity::session("s1"), &content).unwrap(),
            3
        );
        assert_eq!(service.counts(&content).unwrap().share_count, 3);
    }

    #[test]
    fn test_share_requires_existing_content() {
        let (service, _hub) = setup();
        let result = service.record_share(&Identity::user("u1"), &media("missing"));
        assert!(matches!(result, Err(EngagementError::ContentNotFound(_))));
        assert_eq!(service.counts(&media("missing")).unwrap().share_count, 0);
    }

    #[test]
    fn test_comment_tally_round_trip() {
        let (service, _hub) = setup();
        let content = media("m1");

        assert_eq!(service.note_comment_added(&content).unwrap(), 1);
        assert_eq!(service.note_comment_added(&content).unwrap(), 2);
        assert_eq!(service.note_comment_removed(&content).unwrap(), 1);
        assert_eq!(service.note_comment_removed(&content).unwrap(), 0);
        // Removal below zero stays at zero
        assert_eq!(service.note_comment_removed(&content).unwrap(), 0);
    }

    #[test]
    fn test_batch_counts_follow_activity() {
        let (service, _hub) = setup();
        let a = media("m1");
        let b = media("b");

        service.record_share(&Identity::user("u1"), &a).unwrap();
        service.note_comment_added(&a).unwrap();

        let batch = service.counts_batch(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[&a].share_count, 1);
        assert_eq!(batch[&a].comment_count, 1);
        assert_eq!(batch[&b], CounterSnapshot::default());
    }

    #[tokio::test]
    async fn test_noop_comment_removal_does_not_publish() {
        let (service, hub) = setup();
        let content = media("m1");
        let mut receiver = hub.subscribe(&content);

        service.note_comment_removed(&content).unwrap();
        assert!(matches!(receiver.try_recv(), Err(TryRecvError::Empty)));

        service.note_comment_added(&content).unwrap();
        let event = tokio::time::timeout(std::time::Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");
        assert_eq!(event.field, CounterField::Comment);
        assert_eq!(event.new_count, 1);
    }
}
