//! Inbound side of the pipeline: the stream processor and the dispatch pool.

use async_trait::async_trait;
use std::sync::Arc;
use stream_worker::{StreamError, StreamProcessor};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use crate::dispatcher::BroadcastDispatcher;
use crate::error::{NotificationError, NotificationResult};
use crate::models::{NotificationEvent, NotificationRecord};
use crate::repository::NotificationRepository;
use crate::service::NotificationService;

/// Bounded queue of accepted records served by a fixed set of dispatch workers.
pub struct DispatchPool {
    sender: mpsc::Sender<NotificationRecord>,
    workers: JoinSet<()>,
}

/// Cloneable submit side of a [`DispatchPool`]
#[derive(Clone)]
pub struct DispatchHandle {
    sender: mpsc::Sender<NotificationRecord>,
}

impl DispatchHandle {
    /// Waits for queue space, not for the dispatch itself.
    pub async fn submit(&self, record: NotificationRecord) -> NotificationResult<()> {
        self.sender
            .send(record)
            .await
            .map_err(|_| NotificationError::PoolClosed)
    }
}

impl DispatchPool {
    pub fn start<R, D>(service: NotificationService<R, D>) -> Self
    where
        R: NotificationRepository + 'static,
        D: BroadcastDispatcher + 'static,
    {
        let size = service.config().worker_pool_size.max(1);
        let capacity = service.config().queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel::<NotificationRecord>(capacity);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = JoinSet::new();
        for worker in 0..size {
            let service = service.clone();
            let receiver = Arc::clone(&receiver);
            workers.spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some(record) = next else { break };
                    let id = record.id;

                    if let Err(e) = service.attempt_dispatch(record).await {
                        tracing::error!(worker, notification_id = id, error = %e, "Dispatch attempt failed");
                    }
                }
                tracing::debug!(worker, "Dispatch worker stopped");
            });
        }

        tracing::info!(workers = size, "Dispatch pool started");
        Self { sender, workers }
    }

    pub fn handle(&self) -> DispatchHandle {
        DispatchHandle {
            sender: self.sender.clone(),
        }
    }

    /// Stop accepting work and wait for queued records to finish.
    ///
    /// Handles still held elsewhere keep the queue open until they drop.
    pub async fn shutdown(self) {
        let Self {
            sender,
            mut workers,
        } = self;
        drop(sender);

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Dispatch worker panicked");
            }
        }
    }
}

/// Stream processor for `NotificationEvent`s.
///
/// Accepts each event synchronously (PENDING record durably created) and
/// hands the record to the dispatch pool without waiting for delivery.
pub struct EventConsumer<R: NotificationRepository, D: BroadcastDispatcher> {
    service: NotificationService<R, D>,
    dispatch: DispatchHandle,
}

impl<R: NotificationRepository, D: BroadcastDispatcher> EventConsumer<R, D> {
    pub fn new(service: NotificationService<R, D>, dispatch: DispatchHandle) -> Self {
        Self { service, dispatch }
    }
}

#[async_trait]
impl<R, D> StreamProcessor<NotificationEvent> for EventConsumer<R, D>
where
    R: NotificationRepository + 'static,
    D: BroadcastDispatcher + 'static,
{
    async fn process(&self, event: &NotificationEvent) -> Result<(), StreamError> {
        let record = self
            .service
            .accept(event)
            .await
            .map_err(|e| StreamError::transient(e.to_string()))?;

        if let Err(e) = self.dispatch.submit(record.clone()).await {
            // The record is already durable; startup recovery picks it up.
            tracing::warn!(
                notification_id = record.id,
                event_id = %event.event_id,
                error = %e,
                "Could not queue record for dispatch"
            );
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "notification-event-consumer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::dispatcher::MockBroadcastDispatcher;
    use crate::models::{NotificationStatus, NotificationType};
    use crate::repository::{InMemoryNotificationRepository, MockNotificationRepository};
    use crate::retry::retry_backlog;

    fn event() -> NotificationEvent {
        NotificationEvent::new(NotificationType::CustomerUpdated, "CUSTOMER", 9, "{}")
    }

    #[tokio::test]
    async fn test_accept_failure_is_transient() {
        let mut repo = MockNotificationRepository::new();
        repo.expect_create()
            .returning(|_| Err(NotificationError::Database("down".into())));
        let (backlog, _drain) = retry_backlog();
        let service = NotificationService::new(
            repo,
            MockBroadcastDispatcher::new(),
            PipelineConfig::default(),
            backlog,
        );
        let (sender, _receiver) = mpsc::channel(1);
        let consumer = EventConsumer::new(service, DispatchHandle { sender });

        let err = consumer.process(&event()).await.unwrap_err();
        assert!(!err.should_dead_letter(1, 5));
    }

    #[tokio::test]
    async fn test_closed_pool_still_acks() {
        let repo = InMemoryNotificationRepository::new();
        let (backlog, _drain) = retry_backlog();
        let service = NotificationService::new(
            repo.clone(),
            MockBroadcastDispatcher::new(),
            PipelineConfig::default(),
            backlog,
        );
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        let consumer = EventConsumer::new(service, DispatchHandle { sender });

        consumer.process(&event()).await.unwrap();

        let stored = repo.get_by_id(1).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Pending);
    }

    #[tokio::test]
    async fn test_pool_dispatches_submitted_records() {
        let repo = InMemoryNotificationRepository::new();
        let mut dispatcher = MockBroadcastDispatcher::new();
        dispatcher.expect_dispatch().times(3).returning(|_| Ok(()));
        let (backlog, _drain) = retry_backlog();
        let config = PipelineConfig {
            worker_pool_size: 2,
            queue_capacity: 1,
            ..PipelineConfig::default()
        };
        let service = NotificationService::new(repo.clone(), dispatcher, config, backlog);

        let pool = DispatchPool::start(service.clone());
        let consumer = EventConsumer::new(service, pool.handle());
        for _ in 0..3 {
            consumer.process(&event()).await.unwrap();
        }
        drop(consumer);
        pool.shutdown().await;

        let records = repo.list_by_type(None).await.unwrap();
        assert_eq!(records.len(), 3);
        assert!(records
            .iter()
            .all(|r| r.status == NotificationStatus::Processed));
    }
}
