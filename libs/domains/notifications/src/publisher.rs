use redis::aio::ConnectionManager;
use stream_worker::StreamProducer;

use crate::error::NotificationResult;
use crate::models::NotificationEvent;
use crate::streams::NotificationStream;

/// Producer interface for domain operations that emit notification events.
///
/// ```rust,ignore
/// let publisher = NotificationPublisher::new(redis);
/// publisher
///     .publish(&NotificationEvent::new(NotificationType::AccountCreated, "ACCOUNT", id, payload))
///     .await?;
/// ```
#[derive(Clone)]
pub struct NotificationPublisher {
    producer: StreamProducer,
}

impl NotificationPublisher {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            producer: StreamProducer::from_stream_def::<NotificationStream>(redis),
        }
    }

    /// Append the event to the notification stream and return the entry id.
    pub async fn publish(&self, event: &NotificationEvent) -> NotificationResult<String> {
        let entry_id = self.producer.send(event).await?;

        tracing::info!(
            event_id = %event.event_id,
            notification_type = %event.notification_type,
            entity_id = event.entity_id,
            entry_id = %entry_id,
            "Published notification event"
        );
        Ok(entry_id)
    }
}
