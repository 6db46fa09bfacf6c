//! Dead-letter stream for entries the worker gave up on.

use crate::error::StreamResult;
use crate::registry::MessageKey;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

type StreamEntries = Vec<(String, Vec<(String, String)>)>;

/// One dead-lettered entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqEntry {
    /// `None` when the payload could not be decoded
    pub job_id: Option<String>,
    /// Payload exactly as read from the source stream
    pub payload: Option<String>,
    pub error: String,
    pub original_stream_id: String,
    pub delivery_count: u32,
    pub failed_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct DlqManager {
    redis: ConnectionManager,
    dlq_stream: String,
    max_length: i64,
}

impl DlqManager {
    pub fn new(redis: ConnectionManager, dlq_stream: impl Into<String>, max_length: i64) -> Self {
        Self {
            redis,
            dlq_stream: dlq_stream.into(),
            max_length,
        }
    }

    pub fn dlq_stream(&self) -> &str {
        &self.dlq_stream
    }

    pub async fn push(&self, entry: &DlqEntry) -> StreamResult<String> {
        let data = serde_json::to_string(entry)?;
        let mut conn = self.redis.clone();

        let dlq_id: String = redis::cmd("XADD")
            .arg(&self.dlq_stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_length)
            .arg("*")
            .arg(MessageKey::Data.as_ref())
            .arg(&data)
            .query_async(&mut conn)
            .await?;

        info!(
            dlq_id = %dlq_id,
            job_id = ?entry.job_id,
            original_stream_id = %entry.original_stream_id,
            delivery_count = entry.delivery_count,
            error = %entry.error,
            "Moved entry to DLQ"
        );

        Ok(dlq_id)
    }

    /// Oldest entries first
    pub async fn list(&self, count: usize) -> StreamResult<Vec<(String, DlqEntry)>> {
        let mut conn = self.redis.clone();

        let entries: StreamEntries = conn
            .xrange_count(&self.dlq_stream, "-", "+", count)
            .await?;

        let mut out = Vec::with_capacity(entries.len());
        for (id, fields) in entries {
            let Some((_, data)) = fields.iter().find(|(k, _)| k == MessageKey::Data.as_ref())
            else {
                continue;
            };
            match serde_json::from_str::<DlqEntry>(data) {
                Ok(entry) => out.push((id, entry)),
                Err(e) => warn!(dlq_id = %id, error = %e, "Skipping unreadable DLQ entry"),
            }
        }

        Ok(out)
    }

    pub async fn len(&self) -> StreamResult<i64> {
        let mut conn = self.redis.clone();
        Ok(conn.xlen(&self.dlq_stream).await?)
    }
}
