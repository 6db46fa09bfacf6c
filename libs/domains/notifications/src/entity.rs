use crate::models::{NewNotification, NotificationRecord, NotificationStatus, NotificationType};
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::{NotSet, Set};

/// Sea-ORM entity for the notifications table
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub payload: String,
    pub notification_type: NotificationType,
    pub entity_id: i64,
    pub entity_type: String,
    pub status: NotificationStatus,
    pub retry_count: i32,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub processed_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for NotificationRecord {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            payload: model.payload,
            notification_type: model.notification_type,
            entity_id: model.entity_id,
            entity_type: model.entity_type,
            status: model.status,
            retry_count: model.retry_count,
            error_message: model.error_message,
            created_at: model.created_at.into(),
            processed_at: model.processed_at.map(Into::into),
        }
    }
}

impl From<NewNotification> for ActiveModel {
    fn from(input: NewNotification) -> Self {
        ActiveModel {
            id: NotSet,
            title: Set(input.title),
            payload: Set(input.payload),
            notification_type: Set(input.notification_type),
            entity_id: Set(input.entity_id),
            entity_type: Set(input.entity_type),
            status: Set(NotificationStatus::Pending),
            retry_count: Set(0),
            error_message: Set(None),
            created_at: Set(input.created_at.into()),
            processed_at: Set(None),
        }
    }
}

// Full-record write; created_at is immutable and left out.
impl From<&NotificationRecord> for ActiveModel {
    fn from(record: &NotificationRecord) -> Self {
        ActiveModel {
            id: Set(record.id),
            title: Set(record.title.clone()),
            payload: Set(record.payload.clone()),
            notification_type: Set(record.notification_type),
            entity_id: Set(record.entity_id),
            entity_type: Set(record.entity_type.clone()),
            status: Set(record.status),
            retry_count: Set(record.retry_count),
            error_message: Set(record.error_message.clone()),
            created_at: NotSet,
            processed_at: Set(record.processed_at.map(Into::into)),
        }
    }
}
