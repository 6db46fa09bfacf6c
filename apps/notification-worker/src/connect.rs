//! Startup connections with exponential backoff.

use core_config::{database::DatabaseConfig, redis::RedisConfig};
use redis::aio::ConnectionManager;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

const MAX_ATTEMPTS: u32 = 5;
const INITIAL_DELAY_MS: u64 = 200;
const MAX_DELAY_MS: u64 = 5_000;

async fn with_backoff<F, Fut, T, E>(target: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = INITIAL_DELAY_MS;
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= MAX_ATTEMPTS => return Err(e),
            Err(e) => {
                warn!(target_service = target, attempt, delay_ms = delay, error = %e, "Connection failed, retrying");
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay = (delay * 2).min(MAX_DELAY_MS);
                attempt += 1;
            }
        }
    }
}

pub async fn postgres(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .sqlx_logging(false);

    let db = with_backoff("postgres", || Database::connect(options.clone())).await?;
    info!("Connected to PostgreSQL");
    Ok(db)
}

pub async fn redis(config: &RedisConfig) -> redis::RedisResult<ConnectionManager> {
    let client = redis::Client::open(config.url.as_str())?;

    let manager = with_backoff("redis", || {
        let client = client.clone();
        async move {
            let manager = ConnectionManager::new(client).await?;
            let mut conn = manager.clone();
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, redis::RedisError>(manager)
        }
    })
    .await?;

    info!("Connected to Redis");
    Ok(manager)
}
