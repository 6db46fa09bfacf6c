use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect,
};

use crate::{
    entity,
    error::{NotificationError, NotificationResult},
    models::{NewNotification, NotificationRecord, NotificationStatus, NotificationType},
    repository::NotificationRepository,
};

pub struct PgNotificationRepository {
    db: DatabaseConnection,
}

impl PgNotificationRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn create(&self, input: NewNotification) -> NotificationResult<NotificationRecord> {
        let active_model: entity::ActiveModel = input.into();
        let model = active_model.insert(&self.db).await?;

        tracing::debug!(notification_id = model.id, "Stored notification");
        Ok(model.into())
    }

    async fn update(&self, record: &NotificationRecord) -> NotificationResult<NotificationRecord> {
        let active_model: entity::ActiveModel = record.into();

        let model = active_model.update(&self.db).await.map_err(|e| match e {
            DbErr::RecordNotUpdated | DbErr::RecordNotFound(_) => {
                NotificationError::NotFound(record.id)
            }
            other => NotificationError::Database(other.to_string()),
        })?;

        Ok(model.into())
    }

    async fn transition_status(
        &self,
        id: i64,
        from: NotificationStatus,
        to: NotificationStatus,
    ) -> NotificationResult<bool> {
        let result = entity::Entity::update_many()
            .col_expr(entity::Column::Status, Expr::value(to.to_value()))
            .filter(entity::Column::Id.eq(id))
            .filter(entity::Column::Status.eq(from))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    async fn get_by_id(&self, id: i64) -> NotificationResult<Option<NotificationRecord>> {
        let model = entity::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(Into::into))
    }

    async fn list_by_type(
        &self,
        notification_type: Option<NotificationType>,
    ) -> NotificationResult<Vec<NotificationRecord>> {
        let mut query = entity::Entity::find();

        if let Some(notification_type) = notification_type {
            query = query.filter(entity::Column::NotificationType.eq(notification_type));
        }

        let models = query
            .order_by_desc(entity::Column::CreatedAt)
            .order_by_desc(entity::Column::Id)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn list_by_status(
        &self,
        status: NotificationStatus,
        limit: u64,
    ) -> NotificationResult<Vec<NotificationRecord>> {
        let models = entity::Entity::find()
            .filter(entity::Column::Status.eq(status))
            .order_by_asc(entity::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }
}
