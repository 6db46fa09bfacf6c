use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;

use crate::config::PipelineConfig;
use crate::dispatcher::BroadcastDispatcher;
use crate::error::{NotificationError, NotificationResult};
use crate::models::{
    NewNotification, NotificationEvent, NotificationRecord, NotificationStatus, NotificationType,
};
use crate::repository::NotificationRepository;
use crate::retry::RetryBacklog;

/// Pipeline orchestrator: persist, claim, dispatch, settle.
///
/// Every status change is written to the store before the next step starts.
pub struct NotificationService<R: NotificationRepository, D: BroadcastDispatcher> {
    repository: Arc<R>,
    dispatcher: Arc<D>,
    config: Arc<PipelineConfig>,
    backlog: RetryBacklog,
}

impl<R: NotificationRepository, D: BroadcastDispatcher> Clone for NotificationService<R, D> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            dispatcher: Arc::clone(&self.dispatcher),
            config: Arc::clone(&self.config),
            backlog: self.backlog.clone(),
        }
    }
}

impl<R: NotificationRepository, D: BroadcastDispatcher> NotificationService<R, D> {
    pub fn new(repository: R, dispatcher: D, config: PipelineConfig, backlog: RetryBacklog) -> Self {
        Self {
            repository: Arc::new(repository),
            dispatcher: Arc::new(dispatcher),
            config: Arc::new(config),
            backlog,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn backlog(&self) -> &RetryBacklog {
        &self.backlog
    }

    /// Durably create the PENDING record for an inbound event.
    ///
    /// Once this returns `Ok` the event counts as accepted.
    #[instrument(skip(self, event), fields(event_id = %event.event_id, notification_type = %event.notification_type))]
    pub async fn accept(&self, event: &NotificationEvent) -> NotificationResult<NotificationRecord> {
        let record = self
            .repository
            .create(NewNotification::from(event))
            .await?;

        metrics::counter!(
            "notification_records_created_total",
            "type" => record.notification_type.to_string()
        )
        .increment(1);
        tracing::info!(notification_id = record.id, "Accepted notification event");

        Ok(record)
    }

    /// Run one dispatch attempt for a PENDING or RETRY record.
    ///
    /// Returns `None` when another attempt already claimed the record.
    /// Dispatch failures settle the record as RETRY or FAILED and are not
    /// returned as errors; store failures are.
    #[instrument(skip(self, record), fields(notification_id = record.id, retry_count = record.retry_count))]
    pub async fn attempt_dispatch(
        &self,
        mut record: NotificationRecord,
    ) -> NotificationResult<Option<NotificationRecord>> {
        let claimed_from = record.status;
        record.begin_attempt()?;

        let claimed = self
            .repository
            .transition_status(record.id, claimed_from, NotificationStatus::InProgress)
            .await?;
        if !claimed {
            tracing::debug!(from = %claimed_from, "Record already claimed, skipping attempt");
            metrics::counter!("notification_dispatch_skipped_total").increment(1);
            return Ok(None);
        }

        let timeout = self.config.dispatch_timeout;
        let outcome = match tokio::time::timeout(timeout, self.dispatcher.dispatch(&record)).await
        {
            Ok(result) => result,
            Err(_) => Err(NotificationError::DispatchTimeout(timeout.as_millis() as u64)),
        };

        match outcome {
            Ok(()) => record.mark_processed(Utc::now())?,
            Err(err) => {
                let next = record.mark_dispatch_failed(err.to_string(), self.config.max_retries)?;
                tracing::warn!(error = %err, next = %next, "Dispatch failed");
            }
        }

        let stored = self.repository.update(&record).await?;

        metrics::counter!(
            "notification_dispatch_total",
            "status" => stored.status.to_string()
        )
        .increment(1);

        match stored.status {
            NotificationStatus::Retry => {
                self.backlog.push(stored.id);
            }
            NotificationStatus::Failed => {
                tracing::error!(
                    error = stored.error_message.as_deref().unwrap_or_default(),
                    "Notification failed after exhausting retries"
                );
            }
            _ => {
                tracing::info!(status = %stored.status, "Notification dispatched");
            }
        }

        Ok(Some(stored))
    }

    /// Accept an event then run its first dispatch attempt in line.
    pub async fn handle_event(
        &self,
        event: &NotificationEvent,
    ) -> NotificationResult<Option<NotificationRecord>> {
        let record = self.accept(event).await?;
        self.attempt_dispatch(record).await
    }

    pub async fn get_notification(&self, id: i64) -> NotificationResult<NotificationRecord> {
        self.repository
            .get_by_id(id)
            .await?
            .ok_or(NotificationError::NotFound(id))
    }

    /// Newest first; every type when `notification_type` is `None`
    pub async fn list_notifications(
        &self,
        notification_type: Option<NotificationType>,
    ) -> NotificationResult<Vec<NotificationRecord>> {
        self.repository.list_by_type(notification_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::MockBroadcastDispatcher;
    use crate::repository::{InMemoryNotificationRepository, MockNotificationRepository};
    use crate::retry::retry_backlog;
    use std::time::Duration;

    fn event() -> NotificationEvent {
        NotificationEvent::new(NotificationType::AccountCreated, "ACCOUNT", 1, "{}")
    }

    #[tokio::test]
    async fn test_handle_event_success() {
        let repo = InMemoryNotificationRepository::new();
        let mut dispatcher = MockBroadcastDispatcher::new();
        dispatcher.expect_dispatch().times(1).returning(|_| Ok(()));
        let (backlog, mut drain) = retry_backlog();

        let service = NotificationService::new(repo, dispatcher, PipelineConfig::default(), backlog);
        let record = service.handle_event(&event()).await.unwrap().unwrap();

        assert_eq!(record.status, NotificationStatus::Processed);
        assert_eq!(record.retry_count, 0);
        assert!(record.processed_at.is_some());
        assert!(drain.drain().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_sees_in_progress_record() {
        let repo = InMemoryNotificationRepository::new();
        let mut dispatcher = MockBroadcastDispatcher::new();
        dispatcher
            .expect_dispatch()
            .withf(|record| record.status == NotificationStatus::InProgress)
            .times(1)
            .returning(|_| Ok(()));
        let (backlog, _drain) = retry_backlog();

        let service = NotificationService::new(repo, dispatcher, PipelineConfig::default(), backlog);
        service.handle_event(&event()).await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_schedules_retry() {
        let repo = InMemoryNotificationRepository::new();
        let mut dispatcher = MockBroadcastDispatcher::new();
        dispatcher
            .expect_dispatch()
            .returning(|_| Err(NotificationError::Dispatch("socket closed".into())));
        let (backlog, mut drain) = retry_backlog();

        let service = NotificationService::new(repo, dispatcher, PipelineConfig::default(), backlog);
        let record = service.handle_event(&event()).await.unwrap().unwrap();

        assert_eq!(record.status, NotificationStatus::Retry);
        assert_eq!(record.retry_count, 1);
        assert_eq!(drain.drain(), vec![record.id]);
    }

    #[tokio::test]
    async fn test_dispatch_timeout_counts_as_failure() {
        struct Stalled;

        #[async_trait::async_trait]
        impl BroadcastDispatcher for Stalled {
            async fn dispatch(&self, _record: &NotificationRecord) -> NotificationResult<()> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        }

        let config = PipelineConfig {
            dispatch_timeout: Duration::from_millis(20),
            ..PipelineConfig::default()
        };
        let (backlog, _drain) = retry_backlog();
        let service =
            NotificationService::new(InMemoryNotificationRepository::new(), Stalled, config, backlog);

        let record = service.handle_event(&event()).await.unwrap().unwrap();
        assert_eq!(record.status, NotificationStatus::Retry);
        assert!(record.error_message.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_lost_claim_skips_dispatch() {
        let mut repo = MockNotificationRepository::new();
        repo.expect_transition_status().returning(|_, _, _| Ok(false));
        repo.expect_update().never();
        let mut dispatcher = MockBroadcastDispatcher::new();
        dispatcher.expect_dispatch().never();
        let (backlog, _drain) = retry_backlog();

        let service = NotificationService::new(repo, dispatcher, PipelineConfig::default(), backlog);
        let record = NotificationRecord::pending(5, NewNotification::from(&event()));

        assert!(service.attempt_dispatch(record).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_failure_on_accept_propagates() {
        let mut repo = MockNotificationRepository::new();
        repo.expect_create()
            .returning(|_| Err(NotificationError::Database("connection refused".into())));
        let mut dispatcher = MockBroadcastDispatcher::new();
        dispatcher.expect_dispatch().never();
        let (backlog, _drain) = retry_backlog();

        let service = NotificationService::new(repo, dispatcher, PipelineConfig::default(), backlog);
        let err = service.handle_event(&event()).await.unwrap_err();
        assert!(matches!(err, NotificationError::Database(_)));
    }

    #[tokio::test]
    async fn test_terminal_record_is_rejected() {
        let (backlog, _drain) = retry_backlog();
        let service = NotificationService::new(
            InMemoryNotificationRepository::new(),
            MockBroadcastDispatcher::new(),
            PipelineConfig::default(),
            backlog,
        );
        let mut record = NotificationRecord::pending(1, NewNotification::from(&event()));
        record.status = NotificationStatus::Processed;

        let err = service.attempt_dispatch(record).await.unwrap_err();
        assert!(matches!(err, NotificationError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (backlog, _drain) = retry_backlog();
        let service = NotificationService::new(
            InMemoryNotificationRepository::new(),
            MockBroadcastDispatcher::new(),
            PipelineConfig::default(),
            backlog,
        );
        assert!(matches!(
            service.get_notification(3).await,
            Err(NotificationError::NotFound(3))
        ));
    }
}
