//! Consumer-group reads, acknowledgements and claims against one stream.

use crate::config::WorkerConfig;
use crate::error::{StreamError, StreamResult};
use crate::event::{MalformedEntry, ReadBatch, StreamEvent};
use crate::registry::{MessageKey, StreamJob};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Entry fields are `None` when a pending entry was trimmed from the stream.
type StreamEntries = Vec<(String, Option<Vec<(String, String)>>)>;
type StreamReply = Vec<(String, StreamEntries)>;
/// Extended XPENDING row: id, consumer, idle ms, delivery count
type PendingRow = (String, String, u64, u64);

pub struct StreamConsumer {
    redis: ConnectionManager,
    config: WorkerConfig,
}

impl StreamConsumer {
    pub fn new(redis: ConnectionManager, config: WorkerConfig) -> Self {
        Self { redis, config }
    }

    pub fn redis(&self) -> ConnectionManager {
        self.redis.clone()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Create the consumer group (and the stream) if missing.
    pub async fn init_consumer_group(&self) -> StreamResult<()> {
        let mut conn = self.redis.clone();

        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => info!(
                stream = %self.config.stream_name,
                group = %self.config.consumer_group,
                "Created consumer group"
            ),
            Err(e) if e.to_string().contains("BUSYGROUP") => debug!(
                stream = %self.config.stream_name,
                group = %self.config.consumer_group,
                "Consumer group already exists"
            ),
            Err(e) => return Err(StreamError::Redis(e)),
        }

        Ok(())
    }

    /// Re-read entries delivered to this consumer but never acknowledged.
    pub async fn read_own_pending<J: StreamJob>(&self, count: usize) -> StreamResult<ReadBatch<J>> {
        let mut conn = self.redis.clone();

        let rows: Vec<PendingRow> = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("-")
            .arg("+")
            .arg(count)
            .arg(&self.config.consumer_id)
            .query_async(&mut conn)
            .await?;

        if rows.is_empty() {
            return Ok(ReadBatch::empty());
        }

        let deliveries: HashMap<String, u32> = rows
            .into_iter()
            .map(|(id, _, _, delivered)| (id, delivered.saturating_add(1) as u32))
            .collect();

        let reply: Option<StreamReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg("COUNT")
            .arg(count)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg("0")
            .query_async(&mut conn)
            .await?;

        let entries = reply
            .unwrap_or_default()
            .into_iter()
            .flat_map(|(_, entries)| entries)
            .collect();

        Ok(decode_entries(entries, &deliveries))
    }

    /// Block for up to `block_timeout_ms` waiting for new entries.
    pub async fn read_new<J: StreamJob>(&self) -> StreamResult<ReadBatch<J>> {
        let mut conn = self.redis.clone();

        let reply: Option<StreamReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg("BLOCK")
            .arg(self.config.block_timeout_ms)
            .arg("COUNT")
            .arg(self.config.batch_size)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let entries = reply
            .unwrap_or_default()
            .into_iter()
            .flat_map(|(_, entries)| entries)
            .collect();

        Ok(decode_entries(entries, &HashMap::new()))
    }

    /// Take over entries idle longer than the claim timeout, whichever
    /// consumer holds them. This is also how this consumer's own failed
    /// entries come back around.
    pub async fn claim_idle<J: StreamJob>(&self) -> StreamResult<ReadBatch<J>> {
        let mut conn = self.redis.clone();

        let rows: Vec<PendingRow> = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(self.config.claim_timeout_ms)
            .arg("-")
            .arg("+")
            .arg(self.config.batch_size)
            .query_async(&mut conn)
            .await?;

        if rows.is_empty() {
            return Ok(ReadBatch::empty());
        }

        // XCLAIM bumps the delivery counter by one
        let deliveries: HashMap<String, u32> = rows
            .iter()
            .map(|(id, _, _, delivered)| (id.clone(), delivered.saturating_add(1) as u32))
            .collect();

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg(self.config.claim_timeout_ms);
        for (id, _, _, _) in &rows {
            cmd.arg(id);
        }

        let entries: StreamEntries = cmd.query_async(&mut conn).await?;
        let batch = decode_entries(entries, &deliveries);

        if !batch.is_empty() {
            warn!(
                stream = %self.config.stream_name,
                count = batch.len(),
                "Claimed idle pending entries"
            );
        }

        Ok(batch)
    }

    pub async fn ack(&self, stream_id: &str) -> StreamResult<()> {
        let mut conn = self.redis.clone();

        let _: i64 = conn
            .xack(
                &self.config.stream_name,
                &self.config.consumer_group,
                &[stream_id],
            )
            .await?;

        debug!(stream_id = %stream_id, "Acknowledged entry");
        Ok(())
    }

    pub async fn stream_info(&self) -> StreamResult<StreamInfo> {
        let mut conn = self.redis.clone();

        let length: i64 = conn.xlen(&self.config.stream_name).await?;
        let dlq_length: i64 = conn.xlen(&self.config.dlq_stream).await?;

        let summary: RedisResult<(i64, Option<String>, Option<String>, Option<Vec<(String, String)>>)> =
            redis::cmd("XPENDING")
                .arg(&self.config.stream_name)
                .arg(&self.config.consumer_group)
                .query_async(&mut conn)
                .await;

        Ok(StreamInfo {
            stream_name: self.config.stream_name.clone(),
            consumer_group: self.config.consumer_group.clone(),
            length,
            pending_count: summary.map(|(count, ..)| count).unwrap_or(0),
            dlq_length,
        })
    }
}

fn decode_entries<J: StreamJob>(
    entries: StreamEntries,
    deliveries: &HashMap<String, u32>,
) -> ReadBatch<J> {
    let mut batch = ReadBatch::empty();

    for (stream_id, fields) in entries {
        let raw = fields.as_ref().and_then(|fields| {
            fields
                .iter()
                .find(|(k, _)| k == MessageKey::Job.as_ref())
                .map(|(_, v)| v.clone())
        });

        let Some(json) = raw else {
            warn!(stream_id = %stream_id, "Entry has no job field");
            batch.malformed.push(MalformedEntry {
                stream_id,
                raw: None,
                reason: "missing job field".to_string(),
            });
            continue;
        };

        match serde_json::from_str::<J>(&json) {
            Ok(job) => {
                let delivered = deliveries.get(&stream_id).copied().unwrap_or(1);
                batch
                    .events
                    .push(StreamEvent::with_delivery_count(stream_id, job, delivered));
            }
            Err(e) => {
                warn!(stream_id = %stream_id, error = %e, "Failed to decode job");
                batch.malformed.push(MalformedEntry {
                    stream_id,
                    raw: Some(json),
                    reason: e.to_string(),
                });
            }
        }
    }

    batch
}

/// Stream depth and backlog snapshot
#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    pub stream_name: String,
    pub consumer_group: String,
    pub length: i64,
    pub pending_count: i64,
    pub dlq_length: i64,
}
