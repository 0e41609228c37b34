//! HTTP/WebSocket server: live updates, store webhook and sync trigger

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        rejection::JsonRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::broadcaster::Broadcaster;
use super::events::StoreEventPayload;
use crate::ingest::{run_trigger, TriggerContext, TriggerRequest};
use crate::sync::SyncStatus;

/// Upper bound on a single WebSocket frame write
const SOCKET_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared handler state
#[derive(Clone)]
pub struct ServerState {
    pub broadcaster: Broadcaster,
    /// Enables `POST /sync`
    pub trigger: Option<Arc<TriggerContext>>,
    /// Reported by `/health` when a background worker runs
    pub sync_status: Option<Arc<Mutex<SyncStatus>>>,
}

impl ServerState {
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self {
            broadcaster,
            trigger: None,
            sync_status: None,
        }
    }

    pub fn with_trigger(mut self, trigger: Arc<TriggerContext>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_sync_status(mut self, status: Arc<Mutex<SyncStatus>>) -> Self {
        self.sync_status = Some(status);
        self
    }
}

/// WebSocket + webhook server
pub struct RealtimeServer {
    state: ServerState,
    addr: SocketAddr,
}

impl RealtimeServer {
    pub fn new(state: ServerState, addr: SocketAddr) -> Self {
        Self { state, addr }
    }

    /// Build the router
    pub fn router(state: ServerState) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/store-webhook", post(webhook_handler))
            // Path the MinIO notification target was first configured with
            .route("/minio-webhook", post(webhook_handler))
            .route("/sync", post(sync_handler))
            .route("/health", get(health_handler))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Start the server
    pub async fn start(self) -> std::io::Result<()> {
        let app = Self::router(self.state);

        tracing::info!("Server listening on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// Health check endpoint
async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let sync = state.sync_status.as_ref().map(|s| s.lock().clone());
    Json(json!({
        "status": "ok",
        "subscribers": state.broadcaster.subscriber_count(),
        "sync": sync,
    }))
}

/// Store event webhook
async fn webhook_handler(
    State(state): State<ServerState>,
    payload: Result<Json<StoreEventPayload>, JsonRejection>,
) -> impl IntoResponse {
    match payload {
        Ok(Json(payload)) => {
            let relayed = state.broadcaster.ingest(&payload).await;
            tracing::debug!("Webhook relayed {} records", relayed);
            (StatusCode::OK, Json(json!({ "status": "success" })))
        }
        Err(rejection) => {
            tracing::warn!("Rejected webhook payload: {}", rejection.body_text());
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "status": "error", "message": rejection.body_text() })),
            )
        }
    }
}

/// Sync trigger endpoint
async fn sync_handler(
    State(state): State<ServerState>,
    request: Option<Json<TriggerRequest>>,
) -> impl IntoResponse {
    let Some(ctx) = state.trigger.clone() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "message": "sync trigger not configured" })),
        );
    };

    let request = request.map(|Json(r)| r).unwrap_or_default();
    let response = run_trigger(&ctx, request).await;
    let status =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    (status, Json(json!(response.body)))
}

/// WebSocket upgrade handler
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<ServerState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.broadcaster))
}

/// Handle an individual WebSocket connection
async fn handle_socket(socket: WebSocket, broadcaster: Broadcaster) {
    let subscription = broadcaster.connect();
    let connection_id = subscription.id;
    let mut messages = subscription.receiver;
    tracing::info!("Client connected: {}", connection_id);

    let (mut sender, mut receiver) = socket.split();

    // Forward notifications to the client
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = messages.recv().await {
            let write = sender.send(Message::Text(message.to_string()));
            match tokio::time::timeout(SOCKET_WRITE_TIMEOUT, write).await {
                Ok(Ok(())) => {}
                _ => break,
            }
        }
    });

    // Drain inbound frames; they only tell us the client is alive
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    broadcaster.disconnect(connection_id);
    tracing::info!("Client disconnected: {}", connection_id);
}
