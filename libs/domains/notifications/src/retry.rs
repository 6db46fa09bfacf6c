//! Retry backlog and the periodic scheduler that drains it.

use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::MissedTickBehavior;

use crate::dispatcher::BroadcastDispatcher;
use crate::models::NotificationStatus;
use crate::repository::NotificationRepository;
use crate::service::NotificationService;

/// Records read back from the store per status on startup
const RECOVERY_LIMIT: u64 = 10_000;

/// Producer side of the retry backlog. Holds record ids, not records.
#[derive(Clone)]
pub struct RetryBacklog {
    tx: mpsc::UnboundedSender<i64>,
}

impl RetryBacklog {
    pub fn push(&self, id: i64) {
        if self.tx.send(id).is_err() {
            tracing::warn!(notification_id = id, "Retry backlog closed, record stays in store");
        }
    }
}

/// Consumer side of the retry backlog
pub struct BacklogDrain {
    rx: mpsc::UnboundedReceiver<i64>,
}

impl BacklogDrain {
    /// Remove every queued id, first occurrence order, each id once.
    ///
    /// Ids pushed after this returns wait for the next drain.
    pub fn drain(&mut self) -> Vec<i64> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        while let Ok(id) = self.rx.try_recv() {
            if seen.insert(id) {
                ids.push(id);
            }
        }
        ids
    }
}

pub fn retry_backlog() -> (RetryBacklog, BacklogDrain) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RetryBacklog { tx }, BacklogDrain { rx })
}

/// Outcome counts of one scheduler run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryRunSummary {
    pub drained: usize,
    pub processed: usize,
    pub retried: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Re-attempts delivery for records left in RETRY, once per interval.
pub struct RetryScheduler<R: NotificationRepository, D: BroadcastDispatcher> {
    service: NotificationService<R, D>,
    drain: Mutex<BacklogDrain>,
    interval: Duration,
}

impl<R: NotificationRepository, D: BroadcastDispatcher> RetryScheduler<R, D> {
    pub fn new(service: NotificationService<R, D>, drain: BacklogDrain) -> Self {
        let interval = service.config().retry_interval;
        Self {
            service,
            drain: Mutex::new(drain),
            interval,
        }
    }

    /// Queue RETRY records and PENDING records left behind by an earlier process.
    pub async fn recover(&self) -> usize {
        let mut recovered = 0;

        for status in [NotificationStatus::Retry, NotificationStatus::Pending] {
            match self
                .service
                .repository()
                .list_by_status(status, RECOVERY_LIMIT)
                .await
            {
                Ok(records) => {
                    if records.len() as u64 >= RECOVERY_LIMIT {
                        tracing::warn!(
                            status = %status,
                            limit = RECOVERY_LIMIT,
                            "Recovery limit reached, remaining records wait for a later restart"
                        );
                    }
                    recovered += records.len();
                    for record in records {
                        self.service.backlog().push(record.id);
                    }
                }
                Err(e) => {
                    tracing::error!(status = %status, error = %e, "Failed to recover records");
                }
            }
        }

        metrics::counter!("notification_retry_recovered_total").increment(recovered as u64);
        if recovered > 0 {
            tracing::info!(recovered, "Queued records for retry from store");
        }
        recovered
    }

    /// Drain the backlog, then re-run the dispatch attempt for each id.
    pub async fn run_once(&self) -> RetryRunSummary {
        let ids = self.drain.lock().await.drain();
        let mut summary = RetryRunSummary {
            drained: ids.len(),
            ..Default::default()
        };

        for id in ids {
            let record = match self.service.repository().get_by_id(id).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    tracing::warn!(notification_id = id, "Queued record no longer exists");
                    summary.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!(notification_id = id, error = %e, "Failed to load record");
                    self.service.backlog().push(id);
                    summary.errors += 1;
                    continue;
                }
            };

            if !record.status.is_dispatchable() {
                summary.skipped += 1;
                continue;
            }

            match self.service.attempt_dispatch(record).await {
                Ok(Some(settled)) => match settled.status {
                    NotificationStatus::Processed => summary.processed += 1,
                    NotificationStatus::Retry => summary.retried += 1,
                    _ => summary.failed += 1,
                },
                Ok(None) => summary.skipped += 1,
                Err(e) => {
                    tracing::error!(notification_id = id, error = %e, "Retry attempt failed");
                    self.service.backlog().push(id);
                    summary.errors += 1;
                }
            }
        }

        metrics::counter!("notification_retry_drained_total").increment(summary.drained as u64);
        if summary.drained > 0 {
            tracing::info!(?summary, "Retry run complete");
        }
        summary
    }

    /// Recover from the store, then run every interval until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        self.recover().await;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;

        tracing::info!(interval_secs = self.interval.as_secs(), "Retry scheduler started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    self.run_once().await;
                }
            }
        }

        tracing::info!("Retry scheduler stopped");
    }
}
