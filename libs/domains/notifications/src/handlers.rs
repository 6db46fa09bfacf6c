//! HTTP read API and the real-time WebSocket endpoint.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dispatcher::{BroadcastDispatcher, ChannelDispatcher};
use crate::error::NotificationResult;
use crate::models::{NotificationRecord, NotificationType};
use crate::registry::ConnectionRegistry;
use crate::repository::NotificationRepository;
use crate::service::NotificationService;

/// Shared state behind the notification routes
pub struct NotificationState<R: NotificationRepository, D: BroadcastDispatcher> {
    pub service: NotificationService<R, D>,
    pub registry: ConnectionRegistry,
    /// Source of broadcast frames forwarded to sockets
    pub feed: ChannelDispatcher,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type")]
    pub notification_type: Option<NotificationType>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionsResponse {
    pub count: usize,
    pub sessions: Vec<String>,
}

/// Routes: `{ws_endpoint}`, `/notifications`, `/notifications/{id}`, `/sessions`
pub fn router<R, D>(state: NotificationState<R, D>) -> Router
where
    R: NotificationRepository + 'static,
    D: BroadcastDispatcher + 'static,
{
    let ws_endpoint = state.service.config().ws_endpoint.clone();

    Router::new()
        .route(&ws_endpoint, get(ws_handler::<R, D>))
        .route("/notifications", get(list_notifications::<R, D>))
        .route("/notifications/{id}", get(get_notification::<R, D>))
        .route("/sessions", get(list_sessions::<R, D>))
        .with_state(Arc::new(state))
}

/// Records of one type, newest first; every record when `type` is absent
pub async fn list_notifications<R: NotificationRepository, D: BroadcastDispatcher>(
    State(state): State<Arc<NotificationState<R, D>>>,
    Query(query): Query<ListQuery>,
) -> NotificationResult<Json<Vec<NotificationRecord>>> {
    let records = state
        .service
        .list_notifications(query.notification_type)
        .await?;
    Ok(Json(records))
}

pub async fn get_notification<R: NotificationRepository, D: BroadcastDispatcher>(
    State(state): State<Arc<NotificationState<R, D>>>,
    Path(id): Path<i64>,
) -> NotificationResult<Json<NotificationRecord>> {
    Ok(Json(state.service.get_notification(id).await?))
}

pub async fn list_sessions<R: NotificationRepository, D: BroadcastDispatcher>(
    State(state): State<Arc<NotificationState<R, D>>>,
) -> Json<SessionsResponse> {
    let mut sessions: Vec<String> = state.registry.active_sessions().into_iter().collect();
    sessions.sort();

    Json(SessionsResponse {
        count: sessions.len(),
        sessions,
    })
}

pub async fn ws_handler<R, D>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<NotificationState<R, D>>>,
) -> impl IntoResponse
where
    R: NotificationRepository + 'static,
    D: BroadcastDispatcher + 'static,
{
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket<R, D>(socket: WebSocket, state: Arc<NotificationState<R, D>>)
where
    R: NotificationRepository + 'static,
    D: BroadcastDispatcher + 'static,
{
    let session_id = Uuid::new_v4().to_string();
    let mut frames = state.feed.subscribe();
    state.registry.on_connect(session_id.clone());

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let forward_session = session_id.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            match frames.recv().await {
                Ok(frame) => {
                    if ws_sender
                        .send(Message::Text(frame.to_string().into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(session_id = %forward_session, skipped, "Subscriber lagged, frames dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = ws_receiver.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    // Either side ending closes the session.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    debug!(session_id = %session_id, "WebSocket closed");
    state.registry.on_disconnect(&session_id);
}
