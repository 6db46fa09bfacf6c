//! PgNotificationRepository against a migrated Postgres container.

use chrono::Utc;
use domain_notifications::*;
use test_utils::TestDatabase;

fn new_notification(notification_type: NotificationType, entity_id: i64) -> NewNotification {
    NewNotification::from(&NotificationEvent::new(
        notification_type,
        "CUSTOMER",
        entity_id,
        r#"{"name":"Ada"}"#,
    ))
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_create_and_get() {
    let db = TestDatabase::new().await;
    let repo = PgNotificationRepository::new(db.connection());

    let created = repo
        .create(new_notification(NotificationType::CustomerCreated, 1))
        .await
        .unwrap();
    assert!(created.id > 0);
    assert_eq!(created.status, NotificationStatus::Pending);
    assert_eq!(created.retry_count, 0);

    let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(fetched.notification_type, NotificationType::CustomerCreated);
    assert_eq!(fetched.payload, r#"{"name":"Ada"}"#);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_transition_status_compare_and_set() {
    let db = TestDatabase::new().await;
    let repo = PgNotificationRepository::new(db.connection());
    let record = repo
        .create(new_notification(NotificationType::CustomerUpdated, 2))
        .await
        .unwrap();

    assert!(repo
        .transition_status(record.id, NotificationStatus::Pending, NotificationStatus::InProgress)
        .await
        .unwrap());
    assert!(!repo
        .transition_status(record.id, NotificationStatus::Pending, NotificationStatus::InProgress)
        .await
        .unwrap());

    let stored = repo.get_by_id(record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, NotificationStatus::InProgress);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_update_writes_settled_state() {
    let db = TestDatabase::new().await;
    let repo = PgNotificationRepository::new(db.connection());
    let mut record = repo
        .create(new_notification(NotificationType::CustomerDeleted, 3))
        .await
        .unwrap();

    record.begin_attempt().unwrap();
    record.mark_processed(Utc::now()).unwrap();
    let stored = repo.update(&record).await.unwrap();

    assert_eq!(stored.status, NotificationStatus::Processed);
    assert!(stored.processed_at.is_some());
    assert_eq!(stored.created_at, record.created_at);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_update_missing_record_is_not_found() {
    let db = TestDatabase::new().await;
    let repo = PgNotificationRepository::new(db.connection());
    let ghost = NotificationRecord::pending(9_999, new_notification(NotificationType::AccountDeleted, 4));

    let err = repo.update(&ghost).await.unwrap_err();
    assert!(matches!(err, NotificationError::NotFound(9_999)));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_list_by_type_and_status() {
    let db = TestDatabase::new().await;
    let repo = PgNotificationRepository::new(db.connection());

    let older = repo
        .create(new_notification(NotificationType::AccountCreated, 1))
        .await
        .unwrap();
    let newer = repo
        .create(new_notification(NotificationType::AccountCreated, 2))
        .await
        .unwrap();
    repo.create(new_notification(NotificationType::AccountUpdated, 3))
        .await
        .unwrap();

    let accounts = repo
        .list_by_type(Some(NotificationType::AccountCreated))
        .await
        .unwrap();
    assert_eq!(
        accounts.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![newer.id, older.id]
    );

    let pending = repo
        .list_by_status(NotificationStatus::Pending, 2)
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].id, older.id);
}
