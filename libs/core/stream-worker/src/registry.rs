//! Stream definitions and the traits a domain implements to plug into the worker.
//!
//! - `StreamDef`: names and limits of one stream
//! - `StreamJob`: a payload carried in the `job` field of a stream entry
//! - `StreamProcessor`: the domain handler invoked per entry
//! - `MessageKey`: field names used inside stream entries

use crate::error::StreamError;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Field names used in stream entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MessageKey {
    /// JSON payload on the main stream.
    Job,
    /// JSON `DlqEntry` on a dead-letter stream.
    Data,
}

/// Stream definition trait.
///
/// ```rust,ignore
/// pub struct NotificationStream;
///
/// impl StreamDef for NotificationStream {
///     const STREAM_NAME: &'static str = "notification";
///     const CONSUMER_GROUP: &'static str = "notification-group";
///     const DLQ_STREAM: &'static str = "notification:dlq";
/// }
/// ```
pub trait StreamDef: Send + Sync {
    /// Redis stream key.
    const STREAM_NAME: &'static str;

    /// Consumer group reading the stream.
    const CONSUMER_GROUP: &'static str;

    /// Dead-letter stream for entries that cannot be processed.
    const DLQ_STREAM: &'static str;

    /// Approximate MAXLEN applied on XADD.
    const MAX_LENGTH: i64 = 100_000;

    /// Entries read per XREADGROUP call.
    const BATCH_SIZE: usize = 16;

    /// Idle time after which a pending entry is claimed for redelivery.
    const CLAIM_TIMEOUT_MS: u64 = 30_000;

    /// Deliveries after which a failing entry is dead-lettered.
    const MAX_DELIVERIES: u32 = 5;
}

/// A payload carried on a stream.
pub trait StreamJob: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Identifier used in logs and DLQ entries.
    fn job_id(&self) -> String;
}

/// Domain handler invoked for every entry read from the stream.
///
/// Returning `Ok` acknowledges the entry. Returning a transient error leaves
/// it pending so it is redelivered after the claim timeout; a permanent error
/// dead-letters it immediately.
#[async_trait]
pub trait StreamProcessor<J: StreamJob>: Send + Sync {
    async fn process(&self, job: &J) -> Result<(), StreamError>;

    /// Processor name for logs and metric labels.
    fn name(&self) -> &'static str;
}
