//! Stream error types and error categorization
//!
//! The category decides what happens to a failed entry:
//! - **Transient**: left pending, redelivered after the claim timeout
//! - **Permanent**: moved to the DLQ immediately

use thiserror::Error;

/// Category of error for determining redelivery behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transient,
    Permanent,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Permanent => "permanent",
        }
    }
}

/// Stream processing errors
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Processing error: {message}")]
    Processing {
        message: String,
        category: ErrorCategory,
    },

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("Shutdown requested")]
    Shutdown,
}

pub type StreamResult<T> = Result<T, StreamError>;

impl StreamError {
    /// An error worth redelivering
    pub fn transient(message: impl Into<String>) -> Self {
        StreamError::Processing {
            message: message.into(),
            category: ErrorCategory::Transient,
        }
    }

    /// An error no amount of redelivery will fix
    pub fn permanent(message: impl Into<String>) -> Self {
        StreamError::Processing {
            message: message.into(),
            category: ErrorCategory::Permanent,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            StreamError::Redis(_) => ErrorCategory::Transient,
            StreamError::Serialization(_) => ErrorCategory::Permanent,
            StreamError::Processing { category, .. } => *category,
            StreamError::Metrics(_) => ErrorCategory::Permanent,
            StreamError::Shutdown => ErrorCategory::Transient,
        }
    }

    /// Whether an entry that failed with this error on its `delivery_count`-th
    /// delivery should go to the DLQ instead of staying pending.
    pub fn should_dead_letter(&self, delivery_count: u32, max_deliveries: u32) -> bool {
        self.category() == ErrorCategory::Permanent || delivery_count >= max_deliveries
    }

    pub(crate) fn is_nogroup(&self) -> bool {
        matches!(self, StreamError::Redis(e) if e.to_string().contains("NOGROUP"))
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Serialization(err.to_string())
    }
}
