//! Stream definitions for the notifications domain.

use stream_worker::StreamDef;

/// Inbound notification events.
///
/// Producers in other domains append here; the notification worker consumes.
pub struct NotificationStream;

impl StreamDef for NotificationStream {
    const STREAM_NAME: &'static str = "notification";

    const CONSUMER_GROUP: &'static str = "notification-group";

    const DLQ_STREAM: &'static str = "notification:dlq";

    /// Events are acked once the record is stored, so the stream stays short.
    const MAX_LENGTH: i64 = 100_000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_stream_def() {
        assert_eq!(NotificationStream::STREAM_NAME, "notification");
        assert_eq!(NotificationStream::CONSUMER_GROUP, "notification-group");
        assert_eq!(NotificationStream::DLQ_STREAM, "notification:dlq");
        assert_eq!(NotificationStream::MAX_DELIVERIES, 5);
    }
}
