//! Service layer for engagement operations
//!
//! Services sit between the embedding application and the repository layer.
//! Each one wraps database operations with:
//! - Input validation
//! - Content existence gating
//! - Transaction boundaries and bounded retry
//! - Change event emission
//!
//! ## Architecture
//!
//! ```text
//! Embedding application (HTTP, RPC, jobs)
//!     ↓
//! Service Layer (engines)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod counter_service;
pub mod events;
pub mod toggle_service;
pub mod view_service;

// Re-exports
pub use counter_service::CounterService;
pub use events::{spawn_logging_listener, ChangeEvent, ChangeHub};
pub use toggle_service::{BookmarkStatus, LikeStatus, ToggleOutcome, ToggleService};
pub use view_service::{
    ViewEngagement, ViewOutcome, ViewService, MIN_QUALIFYING_DURATION_MS,
    MIN_QUALIFYING_PROGRESS_PCT,
};

use std::sync::Arc;

use crate::catalog::ContentGate;
use crate::config::EngagementConfig;
use crate::db::{EngagementDb, RetryPolicy};

/// Service container for dependency injection
///
/// Holds all engines over one shared database, content gate, and change
/// hub. Embedders construct it once and hand clones of the inner Arcs to
/// their handlers.
pub struct Services {
    pub toggles: Arc<ToggleService>,
    pub views: Arc<ViewService>,
    pub counters: Arc<CounterService>,
    pub changes: Arc<ChangeHub>,
}

impl Services {
    /// Create all services with a shared database and content gate
    pub fn new(
        db: Arc<EngagementDb>,
        gate: Arc<dyn ContentGate>,
        config: &EngagementConfig,
    ) -> Self {
        let changes = Arc::new(ChangeHub::with_capacity(config.channel_capacity));
        let retry = RetryPolicy::from_config(config);

        Self {
            toggles: Arc::new(ToggleService::new(
                db.clone(),
                gate.clone(),
                changes.clone(),
                retry.clone(),
            )),
            views: Arc::new(ViewService::new(
                db.clone(),
                gate.clone(),
                changes.clone(),
                retry.clone(),
            )),
            counters: Arc::new(CounterService::new(db, gate, changes.clone(), retry)),
            changes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticGate;
    use crate::content::{ContentKind, ContentRef};
    use crate::identity::Identity;

    fn media(id: &str) -> ContentRef {
        ContentRef::new(ContentKind::Media, id)
    }

    fn setup() -> (Services, Arc<StaticGate>) {
        let db = Arc::new(EngagementDb::open_in_memory().expect("db"));
        let gate = Arc::new(StaticGate::new());
        gate.insert(media("m1"));
        let services = Services::new(db, gate.clone(), &EngagementConfig::default());
        (services, gate)
    }

    #[test]
    fn test_full_engagement_flow() {
        let (services, _gate) = setup();
        let user = Identity::user("u1");
        let content = media("m1");

        services.toggles.toggle_like(&user, &content).unwrap();
        services.toggles.toggle_bookmark(&user, &content).unwrap();
        services
            .views
            .record_view(&user, &content, &ViewEngagement::completed())
            .unwrap();
        services.counters.record_share(&user, &content).unwrap();
        services.counters.note_comment_added(&content).unwrap();

        let counts = services.counters.counts(&content).unwrap();
        assert_eq!(counts.like_count, 1);
        assert_eq!(counts.bookmark_count, 1);
        assert_eq!(counts.view_count, 1);
        assert_eq!(counts.share_count, 1);
        assert_eq!(counts.comment_count, 1);
    }

    #[tokio::test]
    async fn test_engines_share_one_change_hub() {
        let (services, _gate) = setup();
        let content = media("m1");
        let mut firehose = services.changes.subscribe_all();

        services
            .toggles
            .toggle_like(&Identity::user("u1"), &content)
            .unwrap();
        services
            .views
            .record_view(&Identity::session("s1"), &content, &ViewEngagement::completed())
            .unwrap();

        let first = firehose.recv().await.expect("like event");
        let second = firehose.recv().await.expect("view event");
        assert_eq!(first.new_count, 1);
        assert_eq!(second.new_count, 1);
        assert_ne!(first.field, second.field);
    }
}
