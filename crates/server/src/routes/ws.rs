//! WebSocket subscriber endpoint.
//!
//! Admission runs before the upgrade so a rejected client gets a plain HTTP
//! status: 503 when the global cap is reached, 429 when its address is. An
//! admitted client holds its [`ConnectionPermit`] for the socket's lifetime.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{Extensions, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::connections::{ConnectionLimitError, ConnectionPermit};
use crate::error::ErrorResponse;
use crate::live::hub::BroadcastHub;
use crate::rate_limit::peer_ip;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Ping,
}

/// GET /api/ws
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    extensions: Extensions,
    ws: WebSocketUpgrade,
) -> Response {
    let ip = peer_ip(&extensions, &headers);
    let permit = match state.connections.admit(ip) {
        Ok(permit) => permit,
        Err(e) => {
            crate::metrics::record_subscriber_rejected(e.reason());
            tracing::warn!(ip = %ip, error = %e, "Subscriber rejected");
            let status = match e {
                ConnectionLimitError::GlobalLimitExceeded(_) => StatusCode::SERVICE_UNAVAILABLE,
                ConnectionLimitError::AddressLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            };
            return (status, Json(ErrorResponse::with_details("Connection rejected", e.to_string())))
                .into_response();
        }
    };

    ws.on_upgrade(move |socket| serve_subscriber(socket, state, permit))
}

async fn serve_subscriber(socket: WebSocket, state: Arc<AppState>, permit: ConnectionPermit) {
    let (id, mut frames) = state.hub.subscribe().await;
    let (mut sink, mut stream) = socket.split();
    tracing::debug!(subscriber = id, ip = %permit.ip(), "Subscriber connected");

    let initial = state.hub.snapshot_frame().await;
    let mut open = match initial {
        Some(frame) => sink.send(Message::Text(frame)).await.is_ok(),
        None => true,
    };

    while open {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => open = sink.send(Message::Text(frame)).await.is_ok(),
                None => {
                    // Hub shut down.
                    let _ = sink.send(Message::Close(None)).await;
                    open = false;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if matches!(serde_json::from_str::<ClientMessage>(text.as_str()), Ok(ClientMessage::Ping)) {
                        if let Some(pong) = BroadcastHub::pong_frame() {
                            open = sink.send(Message::Text(pong)).await.is_ok();
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => open = false,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(subscriber = id, error = %e, "Subscriber socket error");
                    open = false;
                }
            },
        }
    }

    state.hub.unsubscribe(id).await;
    tracing::debug!(subscriber = id, "Subscriber disconnected");
    drop(permit);
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(ws_handler))
}
