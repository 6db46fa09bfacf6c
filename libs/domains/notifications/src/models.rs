//! Domain models for the notification pipeline.

use chrono::{DateTime, NaiveDateTime, Utc};
use sea_orm::sea_query::StringLen;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};
use stream_worker::StreamJob;
use uuid::Uuid;

use crate::error::{NotificationError, NotificationResult};

/// Kind of domain change a notification describes
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    #[sea_orm(string_value = "CUSTOMER_CREATED")]
    CustomerCreated,
    #[sea_orm(string_value = "CUSTOMER_UPDATED")]
    CustomerUpdated,
    #[sea_orm(string_value = "CUSTOMER_DELETED")]
    CustomerDeleted,
    #[sea_orm(string_value = "ACCOUNT_CREATED")]
    AccountCreated,
    #[sea_orm(string_value = "ACCOUNT_UPDATED")]
    AccountUpdated,
    #[sea_orm(string_value = "ACCOUNT_DELETED")]
    AccountDeleted,
    #[sea_orm(string_value = "ACCOUNT_BALANCE_UPDATED")]
    AccountBalanceUpdated,
}

impl NotificationType {
    /// Short default title
    pub fn title(&self) -> &'static str {
        match self {
            Self::CustomerCreated => "Customer created",
            Self::CustomerUpdated => "Customer updated",
            Self::CustomerDeleted => "Customer deleted",
            Self::AccountCreated => "Account created",
            Self::AccountUpdated => "Account updated",
            Self::AccountDeleted => "Account deleted",
            Self::AccountBalanceUpdated => "Account balance updated",
        }
    }

    /// Human-readable sentence
    pub fn message(&self) -> &'static str {
        match self {
            Self::CustomerCreated => "A new customer has been created",
            Self::CustomerUpdated => "Customer information has been updated",
            Self::CustomerDeleted => "Customer has been deleted",
            Self::AccountCreated => "A new account has been created",
            Self::AccountUpdated => "Account information has been updated",
            Self::AccountDeleted => "Account has been deleted",
            Self::AccountBalanceUpdated => "Account balance has been updated",
        }
    }
}

/// Delivery lifecycle of a notification record.
///
/// ```text
/// PENDING -> IN_PROGRESS -> PROCESSED
///                 |  ^
///                 v  |
///                RETRY
///                 |
///   IN_PROGRESS -> FAILED   (retries exhausted)
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    Default,
    DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    #[default]
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "IN_PROGRESS")]
    InProgress,
    #[sea_orm(string_value = "PROCESSED")]
    Processed,
    #[sea_orm(string_value = "FAILED")]
    Failed,
    #[sea_orm(string_value = "RETRY")]
    Retry,
}

impl NotificationStatus {
    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Failed)
    }

    /// Statuses a dispatch attempt may start from
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, Self::Pending | Self::Retry)
    }

    pub fn can_transition_to(&self, next: NotificationStatus) -> bool {
        use NotificationStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Retry, InProgress)
                | (InProgress, Processed)
                | (InProgress, Retry)
                | (InProgress, Failed)
        )
    }
}

/// Inbound domain-change event, as published on the `notification` stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    /// Producer-assigned identifier
    pub event_id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub entity_type: String,
    pub entity_id: i64,
    pub title: String,
    pub payload: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl NotificationEvent {
    /// Event with a fresh id, the type's default title and the current time
    pub fn new(
        notification_type: NotificationType,
        entity_type: impl Into<String>,
        entity_id: i64,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            notification_type,
            entity_type: entity_type.into(),
            entity_id,
            title: notification_type.title().to_string(),
            payload: payload.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

impl StreamJob for NotificationEvent {
    fn job_id(&self) -> String {
        self.event_id.clone()
    }
}

/// Accepts RFC 3339 or a zone-less `YYYY-MM-DDTHH:MM:SS[.f]`, read as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp '{}': {}", raw, e))
}

/// Fields of a record before the store assigns its id
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub title: String,
    pub payload: String,
    pub notification_type: NotificationType,
    pub entity_id: i64,
    pub entity_type: String,
    pub created_at: DateTime<Utc>,
}

impl From<&NotificationEvent> for NewNotification {
    fn from(event: &NotificationEvent) -> Self {
        Self {
            title: event.title.clone(),
            payload: event.payload.clone(),
            notification_type: event.notification_type,
            entity_id: event.entity_id,
            entity_type: event.entity_type.clone(),
            created_at: event.timestamp,
        }
    }
}

/// Durable record of one notification and its delivery state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: i64,
    pub title: String,
    pub payload: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub entity_id: i64,
    pub entity_type: String,
    pub status: NotificationStatus,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl NotificationRecord {
    /// A freshly stored record: PENDING, no retries yet
    pub fn pending(id: i64, new: NewNotification) -> Self {
        Self {
            id,
            title: new.title,
            payload: new.payload,
            notification_type: new.notification_type,
            entity_id: new.entity_id,
            entity_type: new.entity_type,
            status: NotificationStatus::Pending,
            retry_count: 0,
            error_message: None,
            created_at: new.created_at,
            processed_at: None,
        }
    }

    fn transition(&mut self, next: NotificationStatus) -> NotificationResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(NotificationError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// PENDING | RETRY -> IN_PROGRESS
    pub fn begin_attempt(&mut self) -> NotificationResult<()> {
        self.transition(NotificationStatus::InProgress)
    }

    /// IN_PROGRESS -> PROCESSED, stamping `processed_at`
    pub fn mark_processed(&mut self, at: DateTime<Utc>) -> NotificationResult<()> {
        self.transition(NotificationStatus::Processed)?;
        self.processed_at = Some(at);
        Ok(())
    }

    /// IN_PROGRESS -> RETRY while `retry_count < max_retries`, else -> FAILED.
    ///
    /// Returns the new status.
    pub fn mark_dispatch_failed(
        &mut self,
        error: impl Into<String>,
        max_retries: i32,
    ) -> NotificationResult<NotificationStatus> {
        let next = if self.retry_count < max_retries {
            NotificationStatus::Retry
        } else {
            NotificationStatus::Failed
        };
        self.transition(next)?;

        if next == NotificationStatus::Retry {
            self.retry_count += 1;
        }
        let error = error.into();
        self.error_message = Some(if error.is_empty() {
            "dispatch failed".to_string()
        } else {
            error
        });

        Ok(next)
    }
}

/// Frame pushed to real-time subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub topic: String,
    pub notification: NotificationRecord,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn in_progress(retry_count: i32) -> NotificationRecord {
        let mut record = NotificationRecord::pending(
            1,
            NewNotification::from(&NotificationEvent::new(
                NotificationType::AccountCreated,
                "ACCOUNT",
                42,
                "{}",
            )),
        );
        record.retry_count = retry_count;
        record.begin_attempt().unwrap();
        record
    }

    #[test]
    fn test_type_wire_format() {
        assert_eq!(
            serde_json::to_string(&NotificationType::AccountBalanceUpdated).unwrap(),
            "\"ACCOUNT_BALANCE_UPDATED\""
        );
        assert_eq!(
            NotificationType::from_str("CUSTOMER_DELETED").unwrap(),
            NotificationType::CustomerDeleted
        );
        assert_eq!(NotificationStatus::InProgress.to_string(), "IN_PROGRESS");
    }

    #[test]
    fn test_type_titles() {
        assert_eq!(NotificationType::CustomerCreated.title(), "Customer created");
        assert_eq!(
            NotificationType::CustomerCreated.message(),
            "A new customer has been created"
        );
    }

    #[test]
    fn test_transition_table() {
        use NotificationStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(Retry.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Retry));
        assert!(!Pending.can_transition_to(Processed));
        assert!(!Processed.can_transition_to(InProgress));
        assert!(!Failed.can_transition_to(Retry));
        assert!(Processed.is_terminal() && Failed.is_terminal());
        assert!(!Retry.is_terminal());
    }

    #[test]
    fn test_event_deserializes_camel_case_with_naive_timestamp() {
        let json = r#"{
            "eventId": "e1",
            "type": "ACCOUNT_CREATED",
            "entityType": "ACCOUNT",
            "entityId": 42,
            "title": "Account created",
            "payload": "{\"balance\":0}",
            "timestamp": "2024-03-01T10:15:30.5"
        }"#;

        let event: NotificationEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.event_id, "e1");
        assert_eq!(event.notification_type, NotificationType::AccountCreated);
        assert_eq!(event.entity_id, 42);
        assert_eq!(
            event.timestamp,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 30).unwrap()
                + chrono::Duration::milliseconds(500)
        );
        assert_eq!(event.job_id(), "e1");
    }

    #[test]
    fn test_event_accepts_rfc3339_with_offset() {
        let ts = parse_timestamp("2024-03-01T12:00:00+02:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_new_event_defaults() {
        let event = NotificationEvent::new(NotificationType::CustomerUpdated, "CUSTOMER", 9, "p");
        assert_eq!(event.title, "Customer updated");
        assert!(Uuid::parse_str(&event.event_id).is_ok());

        let event = event.with_title("Renamed");
        assert_eq!(event.title, "Renamed");
    }

    #[test]
    fn test_pending_record_copies_event() {
        let event = NotificationEvent::new(NotificationType::AccountCreated, "ACCOUNT", 42, "x");
        let record = NotificationRecord::pending(5, NewNotification::from(&event));

        assert_eq!(record.id, 5);
        assert_eq!(record.status, NotificationStatus::Pending);
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.created_at, event.timestamp);
        assert!(record.processed_at.is_none());
    }

    #[test]
    fn test_mark_processed_sets_processed_at_once() {
        let mut record = in_progress(0);
        let at = Utc::now();
        record.mark_processed(at).unwrap();

        assert_eq!(record.status, NotificationStatus::Processed);
        assert_eq!(record.processed_at, Some(at));

        let err = record.mark_processed(Utc::now()).unwrap_err();
        assert!(matches!(err, NotificationError::InvalidTransition { .. }));
        assert_eq!(record.processed_at, Some(at));
    }

    #[test]
    fn test_failure_below_cap_schedules_retry() {
        let mut record = in_progress(2);
        let status = record.mark_dispatch_failed("broker unreachable", 3).unwrap();

        assert_eq!(status, NotificationStatus::Retry);
        assert_eq!(record.retry_count, 3);
        assert_eq!(record.error_message.as_deref(), Some("broker unreachable"));
    }

    #[test]
    fn test_failure_at_cap_is_terminal() {
        let mut record = in_progress(3);
        let status = record.mark_dispatch_failed("", 3).unwrap();

        assert_eq!(status, NotificationStatus::Failed);
        assert_eq!(record.retry_count, 3);
        assert!(!record.error_message.as_deref().unwrap_or_default().is_empty());
        assert!(record.begin_attempt().is_err());
    }

    #[test]
    fn test_cannot_fail_without_attempt() {
        let mut record = NotificationRecord::pending(
            1,
            NewNotification::from(&NotificationEvent::new(
                NotificationType::AccountDeleted,
                "ACCOUNT",
                1,
                "",
            )),
        );
        assert!(record.mark_dispatch_failed("x", 3).is_err());
        assert_eq!(record.status, NotificationStatus::Pending);
        assert_eq!(record.retry_count, 0);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = in_progress(1);
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["type"], "ACCOUNT_CREATED");
        assert_eq!(value["entityId"], 42);
        assert_eq!(value["status"], "IN_PROGRESS");
        assert_eq!(value["retryCount"], 1);
        assert!(value["processedAt"].is_null());
    }
}
