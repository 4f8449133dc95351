//! Like and bookmark toggles
//!
//! One call flips the caller's state and returns the resulting boolean plus
//! the authoritative counter. Record existence is the state; the UNIQUE
//! constraint plus rows-affected checks resolve concurrent duplicates, so
//! there is no application-level locking.
//!
//! The decision read happens outside the write transaction. When two calls
//! race on the same key, both may pick the same path; the conflict-handled
//! writes inside the transaction then let exactly one of them move the
//! counter while the other resolves to the same final state.

use std::sync::Arc;

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::ContentGate;
use crate::content::ContentRef;
use crate::db::models::{InteractionKind, ToggleKind};
use crate::db::{counters, interactions, with_retry, EngagementDb, RetryPolicy};
use crate::error::{EngagementError, Result};
use crate::identity::Identity;
use crate::services::events::{ChangeEvent, ChangeHub};

/// Result of a toggle call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleOutcome {
    /// Caller's state after this call
    pub active: bool,
    /// Authoritative post-commit counter value
    pub count: i64,
}

/// Read-only like state for one identity and content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeStatus {
    pub is_liked: bool,
    pub like_count: i64,
}

/// Read-only bookmark state for one identity and content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkStatus {
    pub is_bookmarked: bool,
    pub bookmark_count: i64,
}

/// Toggle engine for likes and bookmarks
pub struct ToggleService {
    db: Arc<EngagementDb>,
    gate: Arc<dyn ContentGate>,
    hub: Arc<ChangeHub>,
    retry: RetryPolicy,
}

impl ToggleService {
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

    /// Toggle the caller's like on a content item
    pub fn toggle_like(&self, identity: &Identity, content: &ContentRef) -> Result<ToggleOutcome> {
        self.toggle(identity, content, ToggleKind::Like)
    }

    /// Toggle the caller's bookmark on a content item
    pub fn toggle_bookmark(
        &self,
        identity: &Identity,
        content: &ContentRef,
    ) -> Result<ToggleOutcome> {
        self.toggle(identity, content, ToggleKind::Bookmark)
    }

    fn toggle(
        &self,
        identity: &Identity,
        content: &ContentRef,
        kind: ToggleKind,
    ) -> Result<ToggleOutcome> {
        content.validate()?;
        identity.validate()?;
        let user_id = identity.user_id().ok_or_else(|| {
            EngagementError::Unauthenticated(format!(
                "Toggling {} requires a signed-in user",
                kind.as_str()
            ))
        })?;
        let identity_key = identity.storage_key();

        let (active, changed) = with_retry(&self.retry, || {
            let mut conn = self.db.conn()?;
            self.toggle_once(&mut conn, &identity_key, content, kind)
        })?;

        // Post-commit read; contention here is retried, not surfaced
        let count = with_retry(&self.retry, || {
            let mut conn = self.db.conn()?;
            counters::get_snapshot(&mut conn, content)
        })?
        .get(kind.counter_field());

        if changed {
            self.hub.publish(
                ChangeEvent::new(content.clone(), kind.counter_field(), count)
                    .with_actor(user_id)
                    .with_active(active),
            );
        }

        debug!(
            user = %user_id,
            content = %content,
            kind = kind.as_str(),
            active = active,
            count = count,
            "Toggle applied"
        );

        Ok(ToggleOutcome { active, count })
    }

    /// One toggle attempt: decision read, then conflict-handled writes
    fn toggle_once(
        &self,
        conn: &mut SqliteConnection,
        identity_key: &str,
        content: &ContentRef,
        kind: ToggleKind,
    ) -> Result<(bool, bool)> {
        let present = interactions::record_exists(conn, identity_key, content, kind.as_interaction())?;
        self.apply_toggle(conn, identity_key, content, kind, present)
    }

    /// Apply one toggle decision inside a write transaction
    ///
    /// Returns (active, changed). `changed` is false when a concurrent call
    /// already applied the same transition; the counter is untouched then.
    fn apply_toggle(
        &self,
        conn: &mut SqliteConnection,
        identity_key: &str,
        content: &ContentRef,
        kind: ToggleKind,
        present: bool,
    ) -> Result<(bool, bool)> {
        conn.immediate_transaction(|conn| {
            if present {
                let removed = interactions::delete_toggle_record(conn, identity_key, content, kind)?;
                if removed {
                    counters::bump(conn, content, kind.counter_field(), -1)?;
                }
                Ok((false, removed))
            } else {
                // Existence is checked on the creating path only; removal of
                // a record implies the content existed when it was created
                if !self.gate.exists(conn, content)? {
                    return Err(EngagementError::ContentNotFound(content.to_string()));
                }
                let inserted = interactions::insert_toggle_record(conn, identity_key, content, kind)?;
                if inserted {
                    counters::bump(conn, content, kind.counter_field(), 1)?;
                }
                Ok((true, inserted))
            }
        })
    }

    /// Read the caller's like state and the like counter
    pub fn like_status(&self, identity: &Identity, content: &ContentRef) -> Result<LikeStatus> {
        content.validate()?;
        identity.validate()?;

        let mut conn = self.db.conn()?;
        let is_liked = interactions::record_exists(
            &mut conn,
            &identity.storage_key(),
            content,
            InteractionKind::Like,
        )?;
        let like_count = counters::get_snapshot(&mut conn, content)?.like_count;

        Ok(LikeStatus {
            is_liked,
            like_count,
        })
    }

    /// Read the caller's bookmark state and the bookmark counter
    pub fn bookmark_status(
        &self,
        identity: &Identity,
        content: &ContentRef,
    ) -> Result<BookmarkStatus> {
        content.validate()?;
        identity.validate()?;

        let mut conn = self.db.conn()?;
        let is_bookmarked = interactions::record_exists(
            &mut conn,
            &identity.storage_key(),
            content,
            InteractionKind::Bookmark,
        )?;
        let bookmark_count = counters::get_snapshot(&mut conn, content)?.bookmark_count;

        Ok(BookmarkStatus {
            is_bookmarked,
            bookmark_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticGate;
    use crate::content::ContentKind;
    use std::time::Duration;

    fn media(id: &str) -> ContentRef {
        ContentRef::new(ContentKind::Media, id)
    }

    fn user(id: &str) -> Identity {
        Identity::user(id)
    }

    fn setup() -> (ToggleService, Arc<StaticGate>, Arc<ChangeHub>) {
        let db = Arc::new(EngagementDb::open_in_memory().expect("db"));
        let gate = Arc::new(StaticGate::new());
        gate.insert(media("m1"));
        gate.insert(media("m2"));
        let hub = Arc::new(ChangeHub::new());
        let service = ToggleService::new(
            db,
            gate.clone(),
            hub.clone(),
            RetryPolicy::default(),
        );
        (service, gate, hub)
    }

    #[test]
    fn test_like_then_unlike() {
        let (service, _gate, _hub) = setup();
        let identity = user("u1");
        let content = media("m1");

        let on = service.toggle_like(&identity, &content).unwrap();
        assert_eq!(on, ToggleOutcome { active: true, count: 1 });

        let off = service.toggle_like(&identity, &content).unwrap();
        assert_eq!(off, ToggleOutcome { active: false, count: 0 });

        let status = service.like_status(&identity, &content).unwrap();
        assert!(!status.is_liked);
        assert_eq!(status.like_count, 0);
    }

    #[test]
    fn test_toggle_parity_over_many_calls() {
        let (service, _gate, _hub) = setup();
        let identity = user("u1");
        let content = media("m1");

        for _ in 0..4 {
            service.toggle_like(&identity, &content).unwrap();
        }
        let status = service.like_status(&identity, &content).unwrap();
        assert!(!status.is_liked);
        assert_eq!(status.like_count, 0);

        let fifth = service.toggle_like(&identity, &content).unwrap();
        assert_eq!(fifth, ToggleOutcome { active: true, count: 1 });

        let mut conn = service.db.conn().unwrap();
        assert_eq!(
            interactions::records_for_content(&mut conn, &content, InteractionKind::Like).unwrap(),
            1
        );
    }

    #[test]
    fn test_like_and_bookmark_are_independent() {
        let (service, _gate, _hub) = setup();
        let identity = user("u1");
        let content = media("m1");

        service.toggle_like(&identity, &content).unwrap();
        let bookmarked = service.toggle_bookmark(&identity, &content).unwrap();
        assert_eq!(bookmarked, ToggleOutcome { active: true, count: 1 });

        // Unliking must not disturb the bookmark
        let unliked = service.toggle_like(&identity, &content).unwrap();
        assert_eq!(unliked, ToggleOutcome { active: false, count: 0 });

        let status = service.bookmark_status(&identity, &content).unwrap();
        assert!(status.is_bookmarked);
        assert_eq!(status.bookmark_count, 1);
    }

    #[test]
    fn test_session_identity_cannot_toggle() {
        let (service, _gate, _hub) = setup();
        let result = service.toggle_like(&Identity::session("s1"), &media("m1"));
        assert!(matches!(result, Err(EngagementError::Unauthenticated(_))));

        let mut conn = service.db.conn().unwrap();
        assert_eq!(
            interactions::records_for_content(&mut conn, &media("m1"), InteractionKind::Like)
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_unknown_content_rejected_without_mutation() {
        let (service, _gate, _hub) = setup();
        let result = service.toggle_like(&user("u1"), &media("missing"));
        assert!(matches!(result, Err(EngagementError::ContentNotFound(_))));

        let mut conn = service.db.conn().unwrap();
        let snapshot = counters::get_snapshot(&mut conn, &media("missing")).unwrap();
        assert_eq!(snapshot.like_count, 0);
        assert!(counters::get_counters(&mut conn, &media("missing")).unwrap().is_none());
    }

    #[test]
    fn test_double_tap_race_settles_to_single_like() {
        let (service, _gate, _hub) = setup();
        let content = media("m1");

        // Both calls read state before either writes, so both take the
        // insert path; the constraint lets exactly one move the counter
        let mut conn = service.db.conn().unwrap();
        let first = service
            .apply_toggle(&mut conn, "user:u1", &content, ToggleKind::Like, false)
            .unwrap();
        let second = service
            .apply_toggle(&mut conn, "user:u1", &content, ToggleKind::Like, false)
            .unwrap();

        assert_eq!(first, (true, true));
        assert_eq!(second, (true, false));
        assert_eq!(counters::get_snapshot(&mut conn, &content).unwrap().like_count, 1);
        assert_eq!(
            interactions::records_for_content(&mut conn, &content, InteractionKind::Like).unwrap(),
            1
        );
    }

    #[test]
    fn test_racing_unlikes_settle_to_zero() {
        let (service, _gate, _hub) = setup();
        let content = media("m1");
        service.toggle_like(&user("u1"), &content).unwrap();

        let mut conn = service.db.conn().unwrap();
        let first = service
            .apply_toggle(&mut conn, "user:u1", &content, ToggleKind::Like, true)
            .unwrap();
        let second = service
            .apply_toggle(&mut conn, "user:u1", &content, ToggleKind::Like, true)
            .unwrap();

        assert_eq!(first, (false, true));
        assert_eq!(second, (false, false));
        assert_eq!(counters::get_snapshot(&mut conn, &content).unwrap().like_count, 0);
    }

    #[test]
    fn test_concurrent_users_settle_to_exact_count() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = crate::config::EngagementConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let db = Arc::new(EngagementDb::open(&config).expect("db"));
        let gate = Arc::new(StaticGate::new());
        gate.insert(media("m1"));
        let hub = Arc::new(ChangeHub::new());
        let retry = RetryPolicy {
            attempts: 10,
            backoff: Duration::from_millis(5),
            deadline: Duration::from_secs(10),
        };
        let service = Arc::new(ToggleService::new(db.clone(), gate, hub, retry));

        // Users with an odd toggle count end up liked; the rest cancel out
        let toggles_for = |i: usize| i % 3 + 1;
        let expected: i64 = (0..8).filter(|i| toggles_for(*i) % 2 == 1).count() as i64;

        let mut handles = Vec::new();
        for i in 0..8 {
            let service = service.clone();
            handles.push(std::thread::spawn(move || {
                let identity = Identity::user(format!("u{}", i));
                for _ in 0..toggles_for(i) {
                    service.toggle_like(&identity, &media("m1")).expect("toggle");
                }
            }));
        }
        for handle in handles {
            handle.join().expect("thread");
        }

        let mut conn = db.conn().unwrap();
        let snapshot = counters::get_snapshot(&mut conn, &media("m1")).unwrap();
        assert_eq!(snapshot.like_count, expected);
        assert_eq!(
            interactions::records_for_content(&mut conn, &media("m1"), InteractionKind::Like)
                .unwrap(),
            expected
        );
    }

    #[test]
    fn test_simultaneous_double_taps_settle_consistently() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = crate::config::EngagementConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let db = Arc::new(EngagementDb::open(&config).expect("db"));
        let gate = Arc::new(StaticGate::new());
        let hub = Arc::new(ChangeHub::new());
        let retry = RetryPolicy {
            attempts: 10,
            backoff: Duration::from_millis(5),
            deadline: Duration::from_secs(10),
        };
        let service = Arc::new(ToggleService::new(db.clone(), gate.clone(), hub, retry));

        // Two unsynchronized taps either race (both take the insert path) or
        // serialize as like-then-unlike; both ways the counter must match the
        // record count and can never reach two
        for round in 0..20 {
            let content = media(&format!("clip-{}", round));
            gate.insert(content.clone());

            let barrier = Arc::new(std::sync::Barrier::new(2));
            let mut handles = Vec::new();
            for _ in 0..2 {
                let service = service.clone();
                let barrier = barrier.clone();
                let content = content.clone();
                handles.push(std::thread::spawn(move || {
                    barrier.wait();
                    service.toggle_like(&user("u1"), &content).expect("toggle");
                }));
            }
            for handle in handles {
                handle.join().expect("thread");
            }

            let mut conn = db.conn().unwrap();
            let likes = counters::get_snapshot(&mut conn, &content).unwrap().like_count;
            let records =
                interactions::records_for_content(&mut conn, &content, InteractionKind::Like)
                    .unwrap();
            assert!(likes <= 1, "round {}: like_count {}", round, likes);
            assert_eq!(likes, records, "round {}", round);
        }
    }

    #[tokio::test]
    async fn test_toggle_publishes_authoritative_count() {
        let (service, _gate, hub) = setup();
        let content = media("m2");
        let mut receiver = hub.subscribe(&content);

        service.toggle_like(&user("u1"), &content).unwrap();

        let event = tokio::time::timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");
        assert_eq!(event.content, content);
        assert_eq!(event.new_count, 1);
        assert_eq!(event.active, Some(true));
        assert_eq!(event.acting_user.as_deref(), Some("u1"));
    }
}
