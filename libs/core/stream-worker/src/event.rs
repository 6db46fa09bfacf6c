//! Stream event wrapper
//!
//! Pairs a decoded job with its stream metadata.

use crate::registry::StreamJob;
use chrono::{DateTime, Utc};

/// A decoded stream entry
#[derive(Debug, Clone)]
pub struct StreamEvent<J: StreamJob> {
    /// Redis stream entry ID (e.g. "1234567890123-0")
    pub stream_id: String,

    pub job: J,

    /// Append time, parsed from the stream ID
    pub timestamp: DateTime<Utc>,

    /// How many times the group has delivered this entry, including this one
    pub delivery_count: u32,
}

impl<J: StreamJob> StreamEvent<J> {
    pub fn new(stream_id: String, job: J) -> Self {
        Self::with_delivery_count(stream_id, job, 1)
    }

    pub fn with_delivery_count(stream_id: String, job: J, delivery_count: u32) -> Self {
        let timestamp = parse_stream_timestamp(&stream_id);
        Self {
            stream_id,
            job,
            timestamp,
            delivery_count: delivery_count.max(1),
        }
    }

    pub fn job_id(&self) -> String {
        self.job.job_id()
    }

    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}

/// An entry whose `job` field is missing or does not decode as the job type
#[derive(Debug, Clone)]
pub struct MalformedEntry {
    pub stream_id: String,
    pub raw: Option<String>,
    pub reason: String,
}

/// One read from the stream
#[derive(Debug)]
pub struct ReadBatch<J: StreamJob> {
    pub events: Vec<StreamEvent<J>>,
    pub malformed: Vec<MalformedEntry>,
}

impl<J: StreamJob> ReadBatch<J> {
    pub fn empty() -> Self {
        Self {
            events: Vec::new(),
            malformed: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len() + self.malformed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stream IDs are "<milliseconds>-<sequence>"
fn parse_stream_timestamp(stream_id: &str) -> DateTime<Utc> {
    stream_id
        .split('-')
        .next()
        .and_then(|ts| ts.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Serialize, Deserialize, Debug)]
    struct TestJob {
        id: String,
    }

    impl StreamJob for TestJob {
        fn job_id(&self) -> String {
            self.id.clone()
        }
    }

    #[test]
    fn test_parse_timestamp_from_stream_id() {
        let event = StreamEvent::new(
            "1700000000123-0".to_string(),
            TestJob { id: "a".into() },
        );

        assert_eq!(event.timestamp.timestamp_millis(), 1_700_000_000_123);
        assert!(!event.is_redelivery());
        assert_eq!(event.job_id(), "a");
    }

    #[test]
    fn test_redelivery() {
        let event =
            StreamEvent::with_delivery_count("1-0".to_string(), TestJob { id: "b".into() }, 3);
        assert!(event.is_redelivery());
        assert_eq!(event.delivery_count, 3);
    }

    #[test]
    fn test_zero_delivery_count_is_first_delivery() {
        let event =
            StreamEvent::with_delivery_count("1-0".to_string(), TestJob { id: "c".into() }, 0);
        assert_eq!(event.delivery_count, 1);
    }

    #[test]
    fn test_read_batch_len() {
        let mut batch = ReadBatch::<TestJob>::empty();
        assert!(batch.is_empty());
        batch.malformed.push(MalformedEntry {
            stream_id: "1-0".into(),
            raw: None,
            reason: "missing job field".into(),
        });
        assert_eq!(batch.len(), 1);
    }
}
