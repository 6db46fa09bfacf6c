//! Stream producer
//!
//! ```rust,ignore
//! let producer = StreamProducer::from_stream_def::<NotificationStream>(redis);
//! let entry_id = producer.send(&event).await?;
//! ```

use crate::error::StreamResult;
use crate::registry::{MessageKey, StreamDef, StreamJob};
use redis::aio::ConnectionManager;
use tracing::debug;

/// Appends jobs to one stream
#[derive(Clone)]
pub struct StreamProducer {
    redis: ConnectionManager,
    stream_name: String,
    max_length: i64,
}

impl StreamProducer {
    pub fn new(redis: ConnectionManager, stream_name: impl Into<String>) -> Self {
        Self {
            redis,
            stream_name: stream_name.into(),
            max_length: 100_000,
        }
    }

    /// Producer whose stream name and MAXLEN match the worker's definition
    pub fn from_stream_def<S: StreamDef>(redis: ConnectionManager) -> Self {
        Self {
            redis,
            stream_name: S::STREAM_NAME.to_string(),
            max_length: S::MAX_LENGTH,
        }
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// XADD the job as JSON under the `job` field, returning the entry ID.
    pub async fn send<J: StreamJob>(&self, job: &J) -> StreamResult<String> {
        let payload = serde_json::to_string(job)?;
        let mut conn = self.redis.clone();

        let entry_id: String = redis::cmd("XADD")
            .arg(&self.stream_name)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_length)
            .arg("*")
            .arg(MessageKey::Job.as_ref())
            .arg(&payload)
            .query_async(&mut conn)
            .await?;

        debug!(
            stream = %self.stream_name,
            entry_id = %entry_id,
            job_id = %job.job_id(),
            "Appended job to stream"
        );

        Ok(entry_id)
    }
}
