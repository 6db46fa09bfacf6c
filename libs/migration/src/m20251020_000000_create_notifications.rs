use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Notifications::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Notifications::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string(Notifications::Title))
                    .col(text(Notifications::Payload))
                    .col(string_len(Notifications::NotificationType, 32))
                    .col(big_integer(Notifications::EntityId))
                    .col(string(Notifications::EntityType))
                    .col(string_len(Notifications::Status, 32).default("PENDING"))
                    .col(integer(Notifications::RetryCount).default(0))
                    .col(text_null(Notifications::ErrorMessage))
                    .col(timestamp_with_time_zone(Notifications::CreatedAt))
                    .col(timestamp_with_time_zone_null(Notifications::ProcessedAt))
                    .to_owned(),
            )
            .await?;

        // "all records of a type, newest first"
        manager
            .create_index(
                Index::create()
                    .name("idx_notifications_type_created_at")
                    .table(Notifications::Table)
                    .col(Notifications::NotificationType)
                    .col(Notifications::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // retry recovery scans by status
        manager
            .create_index(
                Index::create()
                    .name("idx_notifications_status")
                    .table(Notifications::Table)
                    .col(Notifications::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Notifications::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Notifications {
    Table,
    Id,
    Title,
    Payload,
    NotificationType,
    EntityId,
    EntityType,
    Status,
    RetryCount,
    ErrorMessage,
    CreatedAt,
    ProcessedAt,
}
