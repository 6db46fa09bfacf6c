//! Notifications Domain
//!
//! Consumes domain-change events from the `notification` stream, records each
//! one durably, broadcasts it to connected WebSocket subscribers and retries
//! failed broadcasts.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Redis Stream   │  ← notification (NotificationPublisher appends)
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │  EventConsumer  │  ← accept: PENDING record, then ack
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │  DispatchPool   │  ← bounded queue + N workers
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐        ┌────────────────┐
//! │ NotificationSvc │ ─────► │ RetryScheduler │  ← RETRY ids, every 60 s
//! └────────┬────────┘ ◄───── └────────────────┘
//!          │
//! ┌────────▼────────┐
//! │ChannelDispatcher│  ← broadcast frames to WebSocket sessions
//! └─────────────────┘
//! ```
//!
//! Record lifecycle:
//! `PENDING → IN_PROGRESS → PROCESSED | RETRY → IN_PROGRESS … | FAILED`

pub mod config;
pub mod consumer;
pub mod dispatcher;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod models;
pub mod postgres;
pub mod publisher;
pub mod registry;
pub mod repository;
pub mod retry;
pub mod service;
pub mod streams;

pub use config::PipelineConfig;
pub use consumer::{DispatchHandle, DispatchPool, EventConsumer};
pub use dispatcher::{BroadcastDispatcher, ChannelDispatcher};
pub use error::{NotificationError, NotificationResult};
pub use handlers::{router, NotificationState};
pub use models::{
    BroadcastMessage, NewNotification, NotificationEvent, NotificationRecord, NotificationStatus,
    NotificationType,
};
pub use postgres::PgNotificationRepository;
pub use publisher::NotificationPublisher;
pub use registry::ConnectionRegistry;
pub use repository::{InMemoryNotificationRepository, NotificationRepository};
pub use retry::{retry_backlog, BacklogDrain, RetryBacklog, RetryRunSummary, RetryScheduler};
pub use service::NotificationService;
pub use streams::NotificationStream;
