//! Stream Worker Framework
//!
//! Redis Streams consumer-group plumbing shared by background workers.
//!
//! ## Features
//!
//! - **Generic worker**: `StreamWorker<J, P>` feeds any `StreamJob` to a `StreamProcessor`
//! - **Consumer groups**: competing consumers, at-least-once delivery
//! - **Redelivery**: failed entries stay pending and are claimed again once idle
//! - **Dead Letter Queue**: undecodable entries and repeat failures are parked
//! - **Prometheus metrics** and **health endpoints**
//!
//! ## Example
//!
//! ```ignore
//! use stream_worker::{StreamDef, StreamWorker, WorkerConfig};
//!
//! struct NotificationStream;
//! impl StreamDef for NotificationStream {
//!     const STREAM_NAME: &'static str = "notification";
//!     const CONSUMER_GROUP: &'static str = "notification-group";
//!     const DLQ_STREAM: &'static str = "notification:dlq";
//! }
//!
//! let config = WorkerConfig::from_stream_def::<NotificationStream>();
//! let worker = StreamWorker::new(redis, Arc::new(processor), config);
//! worker.run(shutdown_rx).await?;
//! ```

mod config;
mod consumer;
mod dlq;
mod error;
mod event;
mod health;
pub mod metrics;
mod producer;
mod registry;
mod worker;

pub use config::WorkerConfig;
pub use consumer::{StreamConsumer, StreamInfo};
pub use dlq::{DlqEntry, DlqManager};
pub use error::{ErrorCategory, StreamError, StreamResult};
pub use event::{MalformedEntry, ReadBatch, StreamEvent};
pub use health::{health_router, HealthState, ReadinessCheck};
pub use metrics::{init_metrics, render_metrics, StreamMetrics};
pub use producer::StreamProducer;
pub use registry::{MessageKey, StreamDef, StreamJob, StreamProcessor};
pub use worker::StreamWorker;
