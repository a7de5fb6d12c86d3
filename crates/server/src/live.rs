use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::StreamExt;
use tracing::{debug, info};

use crate::fanout::{write_client, Hub};
use crate::state::AppState;

// ── WebSocket Handler ───────────────────────────────────────────

/// `GET /ws`. Any origin may connect.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_ws(socket, hub))
}

pub async fn handle_ws(socket: WebSocket, hub: Arc<Hub>) {
    let (sender, mut receiver) = socket.split();
    let sub = hub.register();
    let id = sub.id;
    info!(client_id = id, replay = sub.replay.len(), "websocket client connected");

    // The writer owns the send half: replay first, then live frames.
    let mut send_task = tokio::spawn(write_client(hub.clone(), sub, sender));

    // Inbound frames are ignored; reading only detects disconnects.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => {
            debug!(client_id = id, "client closed connection");
            hub.evict(id);
            let _ = send_task.await;
        }
    }
    info!(client_id = id, "websocket client disconnected");
}
