//! Broadcast of notification records to real-time subscribers.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::{NotificationError, NotificationResult};
use crate::models::{BroadcastMessage, NotificationRecord};

/// Pushes one record to every subscriber of a broadcast channel.
///
/// Best effort: an `Err` means the transport reported a send failure. Having
/// no subscribers is not an error. Implementations never mutate the record.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BroadcastDispatcher: Send + Sync {
    async fn dispatch(&self, record: &NotificationRecord) -> NotificationResult<()>;
}

/// Dispatcher backed by a `tokio::sync::broadcast` channel of serialized frames.
///
/// WebSocket sessions subscribe to the same channel and forward each frame.
#[derive(Clone)]
pub struct ChannelDispatcher {
    sender: broadcast::Sender<Arc<str>>,
    topic: String,
}

impl ChannelDispatcher {
    pub fn new(capacity: usize, topic: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            topic: topic.into(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.sender.subscribe()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl BroadcastDispatcher for ChannelDispatcher {
    async fn dispatch(&self, record: &NotificationRecord) -> NotificationResult<()> {
        let message = BroadcastMessage {
            topic: self.topic.clone(),
            notification: record.clone(),
        };
        let frame: Arc<str> = serde_json::to_string(&message)
            .map_err(|e| NotificationError::Serialization(e.to_string()))?
            .into();

        match self.sender.send(frame) {
            Ok(receivers) => {
                tracing::debug!(notification_id = record.id, receivers, "Broadcast notification");
            }
            Err(_) => {
                tracing::debug!(notification_id = record.id, "No subscribers for broadcast");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewNotification, NotificationEvent, NotificationType};

    fn record() -> NotificationRecord {
        NotificationRecord::pending(
            7,
            NewNotification::from(&NotificationEvent::new(
                NotificationType::CustomerCreated,
                "CUSTOMER",
                3,
                r#"{"name":"Ada"}"#,
            )),
        )
    }

    #[tokio::test]
    async fn test_dispatch_without_subscribers_succeeds() {
        let dispatcher = ChannelDispatcher::new(8, "/topic/notifications");
        assert_eq!(dispatcher.subscriber_count(), 0);
        assert!(dispatcher.dispatch(&record()).await.is_ok());
    }

    #[tokio::test]
    async fn test_subscribers_receive_frame() {
        let dispatcher = ChannelDispatcher::new(8, "/topic/notifications");
        let mut rx = dispatcher.subscribe();

        dispatcher.dispatch(&record()).await.unwrap();

        let frame = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["topic"], "/topic/notifications");
        assert_eq!(value["notification"]["id"], 7);
        assert_eq!(value["notification"]["type"], "CUSTOMER_CREATED");
        assert_eq!(value["notification"]["entityId"], 3);
    }
}
