//! Error types for the notifications domain.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::NotificationStatus;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur in the notifications domain.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// The broadcast transport reported a send failure.
    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    /// The broadcast did not complete within the dispatch timeout.
    #[error("Dispatch timed out after {0} ms")]
    DispatchTimeout(u64),

    /// Notification record not found.
    #[error("Notification not found: {0}")]
    NotFound(i64),

    /// A status change the lifecycle does not allow.
    #[error("Invalid status transition for notification {id}: {from} -> {to}")]
    InvalidTransition {
        id: i64,
        from: NotificationStatus,
        to: NotificationStatus,
    },

    /// Durable store error.
    #[error("Database error: {0}")]
    Database(String),

    /// Event bus error.
    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The dispatch worker pool is no longer accepting work.
    #[error("Dispatch pool closed")]
    PoolClosed,
}

impl From<sea_orm::DbErr> for NotificationError {
    fn from(err: sea_orm::DbErr) -> Self {
        NotificationError::Database(err.to_string())
    }
}

impl From<redis::RedisError> for NotificationError {
    fn from(err: redis::RedisError) -> Self {
        NotificationError::Queue(err.to_string())
    }
}

impl From<stream_worker::StreamError> for NotificationError {
    fn from(err: stream_worker::StreamError) -> Self {
        NotificationError::Queue(err.to_string())
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(err: serde_json::Error) -> Self {
        NotificationError::Serialization(err.to_string())
    }
}

impl IntoResponse for NotificationError {
    fn into_response(self) -> Response {
        let status = match &self {
            NotificationError::NotFound(_) => StatusCode::NOT_FOUND,
            NotificationError::InvalidTransition { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
