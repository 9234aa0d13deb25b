//! Realtime feed of newly ingested visit events.
//!
//! Built on `tokio::broadcast`. Every subscriber sees every published event;
//! [`UserSubscriber`] narrows the stream to one owner's records, which is how
//! the ingestion side delivers "new rows for this user".

use crate::types::VisitEvent;
use tokio::sync::broadcast;

/// Default capacity of the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// Publisher side of the realtime insert feed.
#[derive(Clone)]
pub struct EventFeed {
    sender: broadcast::Sender<VisitEvent>,
}

impl EventFeed {
    /// Create a new feed with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new feed with a custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to all subscribers. Returns how many received it;
    /// zero subscribers is not an error.
    pub fn publish(&self, event: VisitEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to every event.
    pub fn subscribe(&self) -> broadcast::Receiver<VisitEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to events owned by `user_id` only.
    pub fn subscribe_for(&self, user_id: impl Into<String>) -> UserSubscriber {
        UserSubscriber {
            receiver: self.sender.subscribe(),
            user_id: user_id.into(),
        }
    }

    /// Return the number of active subscribers on the channel.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscriber that only yields events belonging to one user.
pub struct UserSubscriber {
    receiver: broadcast::Receiver<VisitEvent>,
    user_id: String,
}

impl UserSubscriber {
    /// Receive the next event owned by this subscriber's user.
    ///
    /// Events of other users are silently skipped.
    pub async fn recv(&mut self) -> Result<VisitEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if event.user_id == self.user_id {
                return Ok(event);
            }
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(id: &str, user: &str) -> VisitEvent {
        VisitEvent::new(id, user, "Acme", "/", Utc::now())
    }

    #[tokio::test]
    async fn test_publish_receive_roundtrip() {
        let feed = EventFeed::new();
        let mut rx = feed.subscribe();

        assert_eq!(feed.publish(event("e1", "u1")), 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, "e1");
    }

    #[tokio::test]
    async fn test_user_subscriber_skips_other_users() {
        let feed = EventFeed::new();
        let mut sub = feed.subscribe_for("u1");

        feed.publish(event("other", "u2"));
        feed.publish(event("mine", "u1"));

        let received = sub.recv().await.unwrap();
        assert_eq!(received.id, "mine");
        assert_eq!(sub.user_id(), "u1");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let feed = EventFeed::new();
        assert_eq!(feed.publish(event("e1", "u1")), 0);
    }

    #[test]
    fn test_subscriber_count() {
        let feed = EventFeed::new();
        assert_eq!(feed.subscriber_count(), 0);

        let rx1 = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);

        let _rx2 = feed.subscribe_for("u1");
        assert_eq!(feed.subscriber_count(), 2);

        drop(rx1);
        assert_eq!(feed.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_feed_ends_subscription() {
        let feed = EventFeed::with_capacity(4);
        let mut sub = feed.subscribe_for("u1");
        drop(feed);
        assert!(matches!(
            sub.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}
