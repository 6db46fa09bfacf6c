//! The generic consumer-group worker loop.

use crate::config::WorkerConfig;
use crate::consumer::StreamConsumer;
use crate::dlq::{DlqEntry, DlqManager};
use crate::error::StreamResult;
use crate::event::{MalformedEntry, ReadBatch, StreamEvent};
use crate::metrics::StreamMetrics;
use crate::registry::{StreamJob, StreamProcessor};
use chrono::Utc;
use redis::aio::ConnectionManager;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Upper bound on entries re-read from this consumer's pending list at startup
const STARTUP_PENDING_LIMIT: usize = 1_000;
const MAX_BACKOFF_SECS: u64 = 30;

/// Reads a stream through a consumer group and feeds each entry to a processor.
///
/// - `Ok` from the processor acknowledges the entry
/// - a transient error leaves it pending; it is claimed again once idle for
///   `claim_timeout_ms`
/// - a permanent error, or the `max_deliveries`-th failure, moves it to the
///   DLQ and acknowledges it
/// - entries that do not decode go straight to the DLQ
///
/// Up to `max_concurrent_jobs` entries of a batch run at once. The loop stops
/// when the shutdown channel flips to `true`; the current batch is finished
/// first.
pub struct StreamWorker<J, P>
where
    J: StreamJob,
    P: StreamProcessor<J>,
{
    consumer: Arc<StreamConsumer>,
    handler: JobHandler<P>,
    config: WorkerConfig,
    semaphore: Arc<Semaphore>,
    _job: PhantomData<fn() -> J>,
}

struct JobHandler<P> {
    processor: Arc<P>,
    consumer: Arc<StreamConsumer>,
    dlq: DlqManager,
    metrics: StreamMetrics,
    max_deliveries: u32,
}

impl<P> Clone for JobHandler<P> {
    fn clone(&self) -> Self {
        Self {
            processor: Arc::clone(&self.processor),
            consumer: Arc::clone(&self.consumer),
            dlq: self.dlq.clone(),
            metrics: self.metrics.clone(),
            max_deliveries: self.max_deliveries,
        }
    }
}

impl<J, P> StreamWorker<J, P>
where
    J: StreamJob + 'static,
    P: StreamProcessor<J> + 'static,
{
    pub fn new(redis: ConnectionManager, processor: Arc<P>, config: WorkerConfig) -> Self {
        let consumer = Arc::new(StreamConsumer::new(redis.clone(), config.clone()));
        let dlq = DlqManager::new(redis, &config.dlq_stream, config.dlq_max_length);
        let metrics = StreamMetrics::new(&config.stream_name, processor.name());

        Self {
            handler: JobHandler {
                processor,
                consumer: Arc::clone(&consumer),
                dlq,
                metrics,
                max_deliveries: config.max_deliveries,
            },
            consumer,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            config,
            _job: PhantomData,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run until `shutdown` turns `true` (or its sender is dropped).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> StreamResult<()> {
        info!(
            consumer_id = %self.config.consumer_id,
            stream = %self.config.stream_name,
            group = %self.config.consumer_group,
            processor = %self.handler.processor.name(),
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            "Starting stream worker"
        );

        self.consumer.init_consumer_group().await?;

        match self.consumer.read_own_pending::<J>(STARTUP_PENDING_LIMIT).await {
            Ok(batch) if !batch.is_empty() => {
                info!(count = batch.len(), "Re-processing entries pending from a previous run");
                self.handle_batch(batch).await;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to read own pending entries on startup"),
        }

        let claim_every = Duration::from_millis(self.config.claim_timeout_ms.max(1_000));
        let mut last_claim = Instant::now();
        let mut consecutive_errors: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let read = tokio::select! {
                _ = shutdown.changed() => break,
                read = self.consumer.read_new::<J>() => read,
            };

            match read {
                Ok(batch) => {
                    if consecutive_errors > 0 {
                        info!(consecutive_errors, "Stream connection recovered");
                        consecutive_errors = 0;
                    }
                    if !batch.is_empty() {
                        self.handle_batch(batch).await;
                    }
                }
                Err(e) if e.is_nogroup() => {
                    warn!("Consumer group missing, recreating");
                    if let Err(e) = self.consumer.init_consumer_group().await {
                        error!(error = %e, "Failed to recreate consumer group");
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    let backoff_secs = 2u64.pow(consecutive_errors.min(5)).min(MAX_BACKOFF_SECS);
                    warn!(
                        error = %e,
                        consecutive_errors,
                        backoff_secs,
                        "Stream read failed, backing off"
                    );
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(Duration::from_secs(backoff_secs)) => {}
                    }
                    continue;
                }
            }

            if last_claim.elapsed() >= claim_every {
                match self.consumer.claim_idle::<J>().await {
                    Ok(batch) if !batch.is_empty() => {
                        self.handler.metrics.messages_claimed(batch.len());
                        self.handle_batch(batch).await;
                    }
                    Ok(_) => {}
                    Err(e) => debug!(error = %e, "Failed to claim idle entries"),
                }
                last_claim = Instant::now();
            }
        }

        info!(consumer_id = %self.config.consumer_id, "Stream worker stopped");
        Ok(())
    }

    async fn handle_batch(&self, batch: ReadBatch<J>) {
        for entry in batch.malformed {
            self.handler.dead_letter_malformed(entry).await;
        }

        let mut join_set = JoinSet::new();

        for event in batch.events {
            let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                warn!("Concurrency limiter closed, leaving remaining entries pending");
                break;
            };
            self.handler.metrics.in_flight(
                self.config.max_concurrent_jobs - self.semaphore.available_permits(),
            );

            let handler = self.handler.clone();
            join_set.spawn(async move {
                let _permit = permit;
                handler.process(event).await;
            });
        }

        while let Some(result) = join_set.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Job task panicked, entry left pending");
            }
        }
        self.handler.metrics.in_flight(0);
    }
}

impl<P> JobHandler<P> {
    async fn process<J>(&self, event: StreamEvent<J>)
    where
        J: StreamJob,
        P: StreamProcessor<J>,
    {
        debug!(
            stream_id = %event.stream_id,
            job_id = %event.job_id(),
            delivery_count = event.delivery_count,
            "Processing entry"
        );

        let start = Instant::now();

        let err = match self.processor.process(&event.job).await {
            Ok(()) => {
                self.metrics.job_processed(start.elapsed());
                if let Err(e) = self.consumer.ack(&event.stream_id).await {
                    error!(stream_id = %event.stream_id, error = %e, "Failed to acknowledge entry");
                }
                return;
            }
            Err(e) => e,
        };

        self.metrics.job_failed(err.category().as_str());

        if !err.should_dead_letter(event.delivery_count, self.max_deliveries) {
            self.metrics.job_redelivery_pending();
            warn!(
                stream_id = %event.stream_id,
                job_id = %event.job_id(),
                delivery_count = event.delivery_count,
                max_deliveries = self.max_deliveries,
                error = %err,
                "Entry failed, left pending for redelivery"
            );
            return;
        }

        let entry = DlqEntry {
            job_id: Some(event.job_id()),
            payload: serde_json::to_string(&event.job).ok(),
            error: err.to_string(),
            original_stream_id: event.stream_id.clone(),
            delivery_count: event.delivery_count,
            failed_at: Utc::now(),
        };
        self.dead_letter(&entry).await;
    }

    async fn dead_letter_malformed(&self, entry: MalformedEntry) {
        let entry = DlqEntry {
            job_id: None,
            payload: entry.raw,
            error: entry.reason,
            original_stream_id: entry.stream_id,
            delivery_count: 1,
            failed_at: Utc::now(),
        };
        self.dead_letter(&entry).await;
    }

    /// Acknowledges only after the DLQ write succeeds.
    async fn dead_letter(&self, entry: &DlqEntry) {
        match self.dlq.push(entry).await {
            Ok(_) => {
                self.metrics.job_moved_to_dlq();
                if let Err(e) = self.consumer.ack(&entry.original_stream_id).await {
                    error!(
                        stream_id = %entry.original_stream_id,
                        error = %e,
                        "Failed to acknowledge dead-lettered entry"
                    );
                }
            }
            Err(e) => error!(
                stream_id = %entry.original_stream_id,
                error = %e,
                "Failed to write DLQ entry, leaving entry pending"
            ),
        }
    }
}
