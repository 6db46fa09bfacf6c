use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{NotificationError, NotificationResult};
use crate::models::{NewNotification, NotificationRecord, NotificationStatus, NotificationType};

/// Durable store of notification records.
///
/// Records are never deleted. Every lifecycle step writes through this trait
/// before the pipeline moves on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Insert a PENDING record and return it with its assigned id
    async fn create(&self, input: NewNotification) -> NotificationResult<NotificationRecord>;

    /// Overwrite the mutable fields of an existing record
    async fn update(&self, record: &NotificationRecord) -> NotificationResult<NotificationRecord>;

    /// Compare-and-set on status. Returns `false` when the stored status is
    /// not `from` (someone else owns the record, or it moved on).
    async fn transition_status(
        &self,
        id: i64,
        from: NotificationStatus,
        to: NotificationStatus,
    ) -> NotificationResult<bool>;

    async fn get_by_id(&self, id: i64) -> NotificationResult<Option<NotificationRecord>>;

    /// Newest first; all types when `notification_type` is `None`
    async fn list_by_type(
        &self,
        notification_type: Option<NotificationType>,
    ) -> NotificationResult<Vec<NotificationRecord>>;

    /// Oldest first, at most `limit`
    async fn list_by_status(
        &self,
        status: NotificationStatus,
        limit: u64,
    ) -> NotificationResult<Vec<NotificationRecord>>;
}

/// In-memory repository for tests and local runs
#[derive(Clone, Default)]
pub struct InMemoryNotificationRepository {
    records: Arc<RwLock<HashMap<i64, NotificationRecord>>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn create(&self, input: NewNotification) -> NotificationResult<NotificationRecord> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = NotificationRecord::pending(id, input);

        self.records.write().await.insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, record: &NotificationRecord) -> NotificationResult<NotificationRecord> {
        let mut records = self.records.write().await;
        let stored = records
            .get_mut(&record.id)
            .ok_or(NotificationError::NotFound(record.id))?;

        let created_at = stored.created_at;
        *stored = record.clone();
        stored.created_at = created_at;

        Ok(stored.clone())
    }

    async fn transition_status(
        &self,
        id: i64,
        from: NotificationStatus,
        to: NotificationStatus,
    ) -> NotificationResult<bool> {
        let mut records = self.records.write().await;
        let stored = records.get_mut(&id).ok_or(NotificationError::NotFound(id))?;

        if stored.status != from {
            return Ok(false);
        }
        stored.status = to;
        Ok(true)
    }

    async fn get_by_id(&self, id: i64) -> NotificationResult<Option<NotificationRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list_by_type(
        &self,
        notification_type: Option<NotificationType>,
    ) -> NotificationResult<Vec<NotificationRecord>> {
        let records = self.records.read().await;
        let mut result: Vec<NotificationRecord> = records
            .values()
            .filter(|r| notification_type.is_none_or(|t| r.notification_type == t))
            .cloned()
            .collect();

        result.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(result)
    }

    async fn list_by_status(
        &self,
        status: NotificationStatus,
        limit: u64,
    ) -> NotificationResult<Vec<NotificationRecord>> {
        let records = self.records.read().await;
        let mut result: Vec<NotificationRecord> = records
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();

        result.sort_by_key(|r| r.id);
        result.truncate(limit as usize);
        Ok(result)
    }
}
