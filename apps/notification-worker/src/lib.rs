//! Notification Worker Service
//!
//! ## Architecture
//!
//! ```text
//! Redis Stream (notification)
//!   ↓ (Consumer Group: notification-group)
//! StreamWorker<NotificationEvent, EventConsumer>
//!   ↓ (PENDING record, ack)
//! DispatchPool ──► NotificationService<PgNotificationRepository, ChannelDispatcher>
//!   ↓                     ↑ RETRY ids
//! WebSocket sessions   RetryScheduler
//! ```
//!
//! One HTTP listener serves the read API, the WebSocket feed, health,
//! readiness, metrics and DLQ admin routes.

mod connect;

use async_trait::async_trait;
use axum::Router;
use core_config::{
    database::DatabaseConfig, redis::RedisConfig, server::ServerConfig, Environment, FromEnv,
};
use domain_notifications::{
    retry_backlog, router, ChannelDispatcher, ConnectionRegistry, DispatchPool, EventConsumer,
    NotificationEvent, NotificationService, NotificationState, NotificationStream,
    PgNotificationRepository, PipelineConfig, RetryScheduler,
};
use eyre::{Result, WrapErr};
use migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use stream_worker::{
    health_router, init_metrics, HealthState, ReadinessCheck, StreamWorker, WorkerConfig,
};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const APP_NAME: &str = env!("CARGO_PKG_NAME");
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upper bound on waiting for open HTTP connections after shutdown.
const HTTP_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

struct DatabasePing(DatabaseConnection);

#[async_trait]
impl ReadinessCheck for DatabasePing {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn check(&self) -> Result<(), String> {
        self.0.ping().await.map_err(|e| e.to_string())
    }
}

fn worker_config(pipeline: &PipelineConfig) -> WorkerConfig {
    let config = WorkerConfig::from_stream_def::<NotificationStream>()
        .with_max_concurrent_jobs(pipeline.worker_pool_size);

    match std::env::var("WORKER_CONSUMER_ID") {
        Ok(id) if !id.trim().is_empty() => config.with_consumer_id(id.trim()),
        _ => config,
    }
}

/// Run the notification worker until ctrl-c or SIGTERM.
///
/// # Errors
///
/// Configuration, connection and migration failures abort startup. A fatal
/// stream worker error is returned after the other tasks have stopped.
pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);
    init_metrics().wrap_err("Failed to install Prometheus recorder")?;

    info!(name = APP_NAME, version = APP_VERSION, ?environment, "Starting notification worker");

    let server_config = ServerConfig::from_env().wrap_err("Failed to load server configuration")?;
    let db_config = DatabaseConfig::from_env().wrap_err("Failed to load database configuration")?;
    let redis_config = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;
    let pipeline_config =
        PipelineConfig::from_env().wrap_err("Failed to load pipeline configuration")?;

    let (db, redis) = tokio::try_join!(
        async {
            connect::postgres(&db_config)
                .await
                .wrap_err("Failed to connect to PostgreSQL")
        },
        async {
            connect::redis(&redis_config)
                .await
                .wrap_err("Failed to connect to Redis")
        },
    )?;

    if db_config.run_migrations {
        Migrator::up(&db, None)
            .await
            .wrap_err("Failed to run migrations")?;
        info!("Migrations applied");
    }

    let worker_config = worker_config(&pipeline_config);
    info!(
        stream = %worker_config.stream_name,
        consumer_group = %worker_config.consumer_group,
        consumer_id = %worker_config.consumer_id,
        max_concurrent_jobs = worker_config.max_concurrent_jobs,
        dispatch_workers = pipeline_config.worker_pool_size,
        retry_interval_secs = pipeline_config.retry_interval.as_secs(),
        "Worker configuration loaded"
    );

    let feed = ChannelDispatcher::new(
        pipeline_config.broadcast_capacity,
        pipeline_config.ws_topic.clone(),
    );
    let (backlog, drain) = retry_backlog();
    let service = NotificationService::new(
        PgNotificationRepository::new(db.clone()),
        feed.clone(),
        pipeline_config,
        backlog,
    );

    let pool = DispatchPool::start(service.clone());
    let consumer = Arc::new(EventConsumer::new(service.clone(), pool.handle()));
    let scheduler = RetryScheduler::new(service.clone(), drain);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    {
        let shutdown_tx = Arc::clone(&shutdown_tx);
        tokio::spawn(async move {
            if let Err(e) = shutdown_signal().await {
                error!(error = %e, "Error waiting for shutdown signal");
            }
            let _ = shutdown_tx.send(true);
        });
    }

    let health_state = HealthState::new(redis.clone(), APP_NAME, APP_VERSION, &worker_config)
        .with_check(Arc::new(DatabasePing(db)));

    let app = Router::new()
        .merge(router(NotificationState {
            service,
            registry: ConnectionRegistry::new(),
            feed,
        }))
        .merge(health_router(health_state))
        .layer(TraceLayer::new_for_http());

    let address = server_config.address();
    let listener = TcpListener::bind(&address)
        .await
        .wrap_err_with(|| format!("Failed to bind HTTP server to {}", address))?;
    info!(address = %address, "HTTP server listening");

    let mut http_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = http_shutdown.changed().await;
            })
            .await
    });

    let retry_shutdown = shutdown_rx.clone();
    let retry_task = tokio::spawn(async move { scheduler.run(retry_shutdown).await });

    let worker = StreamWorker::<NotificationEvent, _>::new(redis, consumer, worker_config);
    let worker_result = worker.run(shutdown_rx).await;
    if let Err(e) = &worker_result {
        error!(error = %e, "Stream worker stopped with an error");
    }

    // Stop everything else whether the worker exited cleanly or not.
    let _ = shutdown_tx.send(true);

    // Releases the consumer's pool handle so queued dispatches can drain.
    drop(worker);
    pool.shutdown().await;

    if let Err(e) = retry_task.await {
        error!(error = %e, "Retry scheduler task panicked");
    }

    match tokio::time::timeout(HTTP_DRAIN_TIMEOUT, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!(error = %e, "HTTP server failed"),
        Ok(Err(e)) => error!(error = %e, "HTTP server task panicked"),
        Err(_) => warn!("HTTP connections still open after drain timeout"),
    }

    worker_result.wrap_err("Stream worker failed")?;
    info!("Notification worker stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .wrap_err("Failed to install SIGTERM handler")?;

    #[cfg(unix)]
    let terminate = terminate.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        result = ctrl_c => {
            result.wrap_err("Failed to listen for Ctrl+C")?;
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
