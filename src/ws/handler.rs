use std::sync::Arc;

use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, Query, State},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::channel;
use tracing::{info, warn};
use uuid::Uuid;

use super::connctx::{ConnCtx, OUTBOX_CAPACITY};
use super::hub::CollabHub;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsParams {
    pub user_id: String,
    pub user_name: Option<String>,
}

// Runs disconnect cleanup exactly once when the socket tasks are done
struct DisconnectGuard {
    hub: Arc<CollabHub>,
    connection_id: String,
    user_id: String,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.hub.handle_disconnect(&self.connection_id, &self.user_id);
    }
}

/// WebSocket handler
pub async fn websocket_handler(
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
    State(hub): State<Arc<CollabHub>>,
) -> Response {
    info!("New WebSocket connection attempt for user {}", params.user_id);
    ws.on_upgrade(move |socket| handle_socket(socket, params, hub))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, params: WsParams, hub: Arc<CollabHub>) {
    if params.user_id.is_empty() {
        warn!("Rejecting WebSocket connection without user id");
        return;
    }

    // Generate unique connection ID to identify this client
    let connection_id = Uuid::new_v4().to_string();
    let user_name = params.user_name.unwrap_or_else(|| params.user_id.clone());
    info!("WebSocket connection {} established for user {}", connection_id, params.user_id);

    let (outbox, mut inbox) = channel::<String>(OUTBOX_CAPACITY);
    hub.register(&connection_id, ConnCtx {
        user_id: params.user_id.clone(),
        user_name,
        outbox,
    });
    let _disconnect = DisconnectGuard {
        hub: hub.clone(),
        connection_id: connection_id.clone(),
        user_id: params.user_id.clone(),
    };

    let (mut sender, mut receiver) = socket.split();

    // Forward queued messages to the client; ends once the hub drops the outbox
    let mut send_task = tokio::spawn(async move {
        while let Some(text) = inbox.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Feed client text frames into the hub; anything else but close is ignored
    let recv_hub = hub.clone();
    let recv_connection_id = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => recv_hub.handle_text(&recv_connection_id, &text),
                Message::Close(_) => break,
                _ => continue,
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };
    info!("WebSocket connection {} terminated", connection_id);
}
