//! Change notification for counter updates
//!
//! Every successful counter change produces one [`ChangeEvent`] carrying the
//! authoritative post-commit count. Consumers replace their cached value with
//! `new_count`; they never apply deltas, so a missed event only delays
//! convergence until the next one.
//!
//! Delivery is at-most-once and fire-and-forget. Publish failures (no
//! subscribers, lagging receivers) never abort the operation that produced
//! the event.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::content::ContentRef;
use crate::db::models::{current_timestamp, CounterField};

/// Counter change notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub content: ContentRef,
    /// Counter that moved
    pub field: CounterField,
    /// Authoritative post-commit value, not a delta
    pub new_count: i64,
    /// User behind the change, when the operation had one
    pub acting_user: Option<String>,
    /// Toggle state after the change; None for non-toggle counters
    pub active: Option<bool>,
    pub occurred_at: String,
}

impl ChangeEvent {
    pub fn new(content: ContentRef, field: CounterField, new_count: i64) -> Self {
        Self {
            content,
            field,
            new_count,
            acting_user: None,
            active: None,
            occurred_at: current_timestamp(),
        }
    }

    pub fn with_actor(mut self, user_id: impl Into<String>) -> Self {
        self.acting_user = Some(user_id.into());
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }
}

/// Broadcast hub for counter changes
///
/// One firehose channel carries every event; per-content topic channels are
/// created lazily by subscription and dropped once their last receiver goes
/// away. Senders never block and never fail the publisher.
pub struct ChangeHub {
    capacity: usize,
    firehose: broadcast::Sender<ChangeEvent>,
    topics: DashMap<String, broadcast::Sender<ChangeEvent>>,
}

impl ChangeHub {
    /// Create a hub with default channel capacity
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create a hub with the given per-channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (firehose, _) = broadcast::channel(capacity.max(1));
        Self {
            capacity: capacity.max(1),
            firehose,
            topics: DashMap::new(),
        }
    }

    /// Publish an event to the firehose and the matching content topic
    pub fn publish(&self, event: ChangeEvent) {
        trace!(
            content = %event.content,
            field = ?event.field,
            new_count = event.new_count,
            "Publishing change event"
        );

        // Ignore send errors (no subscribers)
        let _ = self.firehose.send(event.clone());

        let key = event.content.topic_key();
        let mut stale = false;
        if let Some(sender) = self.topics.get(&key) {
            if sender.receiver_count() > 0 {
                let _ = sender.send(event);
            } else {
                stale = true;
            }
        }
        // Guard must be dropped before mutating the map
        if stale {
            self.topics.remove_if(&key, |_, sender| sender.receiver_count() == 0);
        }
    }

    /// Subscribe to changes for one content item
    pub fn subscribe(&self, content: &ContentRef) -> broadcast::Receiver<ChangeEvent> {
        self.topics
            .entry(content.topic_key())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Subscribe to all changes
    pub fn subscribe_all(&self) -> broadcast::Receiver<ChangeEvent> {
        self.firehose.subscribe()
    }

    /// Number of firehose subscribers
    pub fn subscriber_count(&self) -> usize {
        self.firehose.receiver_count()
    }

    /// Number of live per-content topics
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a background task that logs all change events
pub fn spawn_logging_listener(hub: Arc<ChangeHub>) -> tokio::task::JoinHandle<()> {
    let mut receiver = hub.subscribe_all();

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    debug!(
                        content = %event.content,
                        field = ?event.field,
                        new_count = event.new_count,
                        "Counter changed"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Change listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Change hub closed, stopping listener");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentKind;
    use tokio::time::{timeout, Duration};

    fn media(id: &str) -> ContentRef {
        ContentRef::new(ContentKind::Media, id)
    }

    #[tokio::test]
    async fn test_topic_subscriber_sees_only_its_content() {
        let hub = ChangeHub::new();
        let mut receiver = hub.subscribe(&media("a"));

        hub.publish(ChangeEvent::new(media("b"), CounterField::Like, 5));
        hub.publish(
            ChangeEvent::new(media("a"), CounterField::Like, 1)
                .with_actor("u1")
                .with_active(true),
        );

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");

        assert_eq!(event.content, media("a"));
        assert_eq!(event.new_count, 1);
        assert_eq!(event.acting_user.as_deref(), Some("u1"));
        assert_eq!(event.active, Some(true));
    }

    #[tokio::test]
    async fn test_firehose_sees_everything() {
        let hub = ChangeHub::new();
        let mut receiver = hub.subscribe_all();

        hub.publish(ChangeEvent::new(media("a"), CounterField::View, 10));
        hub.publish(ChangeEvent::new(media("b"), CounterField::Share, 2));

        let first = receiver.recv().await.expect("first");
        let second = receiver.recv().await.expect("second");
        assert_eq!(first.content, media("a"));
        assert_eq!(second.field, CounterField::Share);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_harmless() {
        let hub = ChangeHub::new();
        hub.publish(ChangeEvent::new(media("a"), CounterField::Like, 1));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_topic_is_pruned_on_publish() {
        let hub = ChangeHub::new();
        let receiver = hub.subscribe(&media("a"));
        assert_eq!(hub.topic_count(), 1);
        drop(receiver);

        hub.publish(ChangeEvent::new(media("a"), CounterField::Like, 1));
        assert_eq!(hub.topic_count(), 0);
    }

    #[tokio::test]
    async fn test_event_serializes() {
        let event = ChangeEvent::new(media("a"), CounterField::Bookmark, 3).with_active(false);
        let json = serde_json::to_string(&event).expect("serialize");
        assert!(json.contains("\"bookmark\""));
        assert!(json.contains("\"new_count\":3"));
    }
}
