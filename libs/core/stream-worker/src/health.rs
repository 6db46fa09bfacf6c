//! Health, readiness, stream monitoring and metrics endpoints.
//!
//! - `/health`: liveness, always 200 while the process serves requests
//! - `/ready`: Redis PING plus any extra [`ReadinessCheck`]s
//! - `/stream/info`: stream length, pending and DLQ depth
//! - `/metrics`: Prometheus exposition
//! - `/admin/dlq/messages`: oldest dead-lettered entries

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::config::WorkerConfig;
use crate::consumer::StreamConsumer;
use crate::dlq::DlqManager;
use crate::metrics;

/// A dependency the service needs before it can take traffic.
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self) -> Result<(), String>;
}

struct RedisPing(ConnectionManager);

#[async_trait]
impl ReadinessCheck for RedisPing {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn check(&self) -> Result<(), String> {
        let mut conn = self.0.clone();
        let reply: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| e.to_string())?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(format!("unexpected response: {}", reply))
        }
    }
}

#[derive(Clone)]
pub struct HealthState {
    pub app_name: String,
    pub app_version: String,
    consumer: Arc<StreamConsumer>,
    dlq: DlqManager,
    checks: Vec<Arc<dyn ReadinessCheck>>,
}

impl HealthState {
    pub fn new(
        redis: ConnectionManager,
        app_name: impl Into<String>,
        app_version: impl Into<String>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            app_version: app_version.into(),
            consumer: Arc::new(StreamConsumer::new(redis.clone(), config.clone())),
            dlq: DlqManager::new(redis.clone(), &config.dlq_stream, config.dlq_max_length),
            checks: vec![Arc::new(RedisPing(redis))],
        }
    }

    /// Add a readiness check (database, downstream service, ...)
    pub fn with_check(mut self, check: Arc<dyn ReadinessCheck>) -> Self {
        self.checks.push(check);
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub name: String,
    pub version: String,
}

pub async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        name: state.app_name,
        version: state.app_version,
    })
}

pub async fn ready_handler(State(state): State<HealthState>) -> (StatusCode, Json<Value>) {
    let (ready, checks) = run_checks(&state.checks).await;

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if ready { "ready" } else { "not_ready" },
            "checks": checks,
        })),
    )
}

async fn run_checks(checks: &[Arc<dyn ReadinessCheck>]) -> (bool, Map<String, Value>) {
    let mut ready = true;
    let mut results = Map::new();

    for check in checks {
        let outcome = match check.check().await {
            Ok(()) => Value::from("ok"),
            Err(e) => {
                ready = false;
                Value::from(e)
            }
        };
        results.insert(check.name().to_string(), outcome);
    }

    (ready, results)
}

pub async fn stream_info_handler(State(state): State<HealthState>) -> impl IntoResponse {
    match state.consumer.stream_info().await {
        Ok(info) => (StatusCode::OK, Json(json!(info))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

pub async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}

#[derive(Debug, Deserialize)]
pub struct DlqListQuery {
    #[serde(default = "default_dlq_count")]
    pub count: usize,
}

fn default_dlq_count() -> usize {
    50
}

pub async fn dlq_list_handler(
    State(state): State<HealthState>,
    Query(query): Query<DlqListQuery>,
) -> impl IntoResponse {
    match state.dlq.list(query.count.min(1_000)).await {
        Ok(entries) => {
            let entries: Vec<Value> = entries
                .into_iter()
                .map(|(id, entry)| json!({ "id": id, "entry": entry }))
                .collect();
            (
                StatusCode::OK,
                Json(json!({ "stream": state.dlq.dlq_stream(), "entries": entries })),
            )
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/stream/info", get(stream_info_handler))
        .route("/metrics", get(metrics_handler))
        .route("/admin/dlq/messages", get(dlq_list_handler))
        .with_state(state)
}
