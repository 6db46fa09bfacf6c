//! Worker configuration

use crate::registry::StreamDef;
use uuid::Uuid;

/// Configuration for the stream worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub stream_name: String,
    pub consumer_group: String,

    /// Unique consumer name inside the group. Keep it stable across restarts
    /// so the consumer's own pending entries are re-read on startup.
    pub consumer_id: String,

    pub dlq_stream: String,

    /// Approximate MAXLEN for the DLQ stream
    pub dlq_max_length: i64,

    /// Entries read per XREADGROUP call
    pub batch_size: usize,

    /// XREADGROUP BLOCK timeout
    pub block_timeout_ms: u64,

    /// Entries processed concurrently within one batch
    pub max_concurrent_jobs: usize,

    /// Idle time before a pending entry is claimed for redelivery
    pub claim_timeout_ms: u64,

    /// Deliveries after which a failing entry is dead-lettered
    pub max_deliveries: u32,
}

impl WorkerConfig {
    pub fn from_stream_def<S: StreamDef>() -> Self {
        Self {
            stream_name: S::STREAM_NAME.to_string(),
            consumer_group: S::CONSUMER_GROUP.to_string(),
            consumer_id: format!("worker-{}", Uuid::new_v4()),
            dlq_stream: S::DLQ_STREAM.to_string(),
            dlq_max_length: 10_000,
            batch_size: S::BATCH_SIZE,
            block_timeout_ms: 2_000,
            max_concurrent_jobs: 4,
            claim_timeout_ms: S::CLAIM_TIMEOUT_MS,
            max_deliveries: S::MAX_DELIVERIES,
        }
    }

    pub fn with_consumer_id(mut self, id: impl Into<String>) -> Self {
        self.consumer_id = id.into();
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_block_timeout_ms(mut self, timeout: u64) -> Self {
        self.block_timeout_ms = timeout;
        self
    }

    pub fn with_max_concurrent_jobs(mut self, count: usize) -> Self {
        self.max_concurrent_jobs = count.max(1);
        self
    }

    pub fn with_claim_timeout_ms(mut self, timeout: u64) -> Self {
        self.claim_timeout_ms = timeout;
        self
    }

    pub fn with_max_deliveries(mut self, max: u32) -> Self {
        self.max_deliveries = max.max(1);
        self
    }
}
