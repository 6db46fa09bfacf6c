use core_config::{env_or_default, env_parse, ConfigError, FromEnv};
use std::time::Duration;

/// Tuning for the notification pipeline
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Retries allowed after the first failed dispatch
    pub max_retries: i32,
    pub retry_interval: Duration,
    pub dispatch_timeout: Duration,
    pub worker_pool_size: usize,
    pub queue_capacity: usize,
    pub broadcast_capacity: usize,
    pub ws_endpoint: String,
    pub ws_topic: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_interval: Duration::from_secs(60),
            dispatch_timeout: Duration::from_millis(5000),
            worker_pool_size: 8,
            queue_capacity: 256,
            broadcast_capacity: 1024,
            ws_endpoint: "/ws".to_string(),
            ws_topic: "/topic/notifications".to_string(),
        }
    }
}

impl FromEnv for PipelineConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_retries: i32 = env_parse("NOTIFICATION_MAX_RETRIES", defaults.max_retries)?;
        if max_retries < 0 {
            return Err(ConfigError::ParseError {
                key: "NOTIFICATION_MAX_RETRIES".to_string(),
                details: "must not be negative".to_string(),
            });
        }

        let mut ws_endpoint = env_or_default("NOTIFICATION_WS_ENDPOINT", &defaults.ws_endpoint);
        if !ws_endpoint.starts_with('/') {
            ws_endpoint.insert(0, '/');
        }

        Ok(Self {
            max_retries,
            retry_interval: Duration::from_secs(
                env_parse::<u64>("NOTIFICATION_RETRY_INTERVAL_SECS", 60)?.max(1),
            ),
            dispatch_timeout: Duration::from_millis(
                env_parse::<u64>("NOTIFICATION_DISPATCH_TIMEOUT_MS", 5000)?.max(1),
            ),
            worker_pool_size: env_parse::<usize>(
                "NOTIFICATION_WORKER_POOL_SIZE",
                defaults.worker_pool_size,
            )?
            .max(1),
            queue_capacity: env_parse::<usize>(
                "NOTIFICATION_QUEUE_CAPACITY",
                defaults.queue_capacity,
            )?
            .max(1),
            broadcast_capacity: env_parse::<usize>(
                "NOTIFICATION_BROADCAST_CAPACITY",
                defaults.broadcast_capacity,
            )?
            .max(1),
            ws_endpoint,
            ws_topic: env_or_default("NOTIFICATION_WS_TOPIC", &defaults.ws_topic),
        })
    }
}
