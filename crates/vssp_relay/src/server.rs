use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::ingest::ViewerEvent;
use crate::registry::ViewerChannel;
use crate::stats::{RelayStats, SharedStats};

/// State shared by every viewer connection and status request.
#[derive(Clone)]
pub struct ServerState {
    events: mpsc::Sender<ViewerEvent>,
    next_viewer: Arc<AtomicU64>,
    queue_depth: usize,
    stats: SharedStats,
}

impl ServerState {
    pub fn new(events: mpsc::Sender<ViewerEvent>, queue_depth: usize, stats: SharedStats) -> Self {
        Self {
            events,
            next_viewer: Arc::new(AtomicU64::new(1)),
            queue_depth,
            stats,
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn get_stats(State(state): State<ServerState>) -> Json<RelayStats> {
    Json(state.stats.read().await.clone())
}

async fn viewer_upgrade(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    ws.on_upgrade(move |socket| serve_viewer(socket, state))
}

pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(viewer_upgrade))
        .route("/health", get(health))
        .route("/api/stats", get(get_stats))
        .layer(cors)
        .with_state(state)
}

/// One viewer connection: register a channel with the relay loop and drain it
/// into the socket until either side goes away.
async fn serve_viewer(mut socket: WebSocket, state: ServerState) {
    let id = state.next_viewer.fetch_add(1, Ordering::Relaxed);
    let (channel, mut envelopes) = ViewerChannel::new(state.queue_depth);

    if state
        .events
        .send(ViewerEvent::Joined { id, channel })
        .await
        .is_err()
    {
        warn!(viewer = id, "Relay loop is gone, refusing viewer");
        return;
    }
    info!(viewer = id, "Viewer connected");

    // Overwritten envelopes are already counted by the relay as they happen.
    let mut lagged = 0u64;
    loop {
        tokio::select! {
            next = envelopes.recv() => match next {
                Ok(envelope) => {
                    if let Err(e) = socket.send(Message::Binary(envelope.to_vec())).await {
                        debug!(viewer = id, error = %e, "Viewer send failed");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    lagged += skipped;
                    debug!(viewer = id, skipped, "Viewer fell behind, skipping to newer frames");
                }
                // Removed by the relay after a failed offer, or shutting down.
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(viewer = id, error = %e, "Viewer receive failed");
                    break;
                }
            },
        }
    }

    drop(envelopes);
    let _ = state.events.send(ViewerEvent::Left { id }).await;
    info!(viewer = id, lagged, "Viewer disconnected");
}

/// Serve viewers and the status API on `listener` until the task is dropped.
pub async fn serve(listener: TcpListener, state: ServerState) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}
