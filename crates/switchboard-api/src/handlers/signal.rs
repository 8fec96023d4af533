//! Signaling endpoint: WebSocket upgrade handed to the hub.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{future, SinkExt, StreamExt};
use serde::Deserialize;

use switchboard_hub::{Hub, Incoming};

use super::ApiState;

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    #[serde(rename = "peerId", default)]
    pub peer_id: String,
}

pub async fn handle_signal(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<ApiState>,
) -> Response {
    if params.peer_id.is_empty() {
        tracing::info!("upgrade refused: missing peerId");
        return (StatusCode::BAD_REQUEST, "missing peerId").into_response();
    }

    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| run_socket(hub, params.peer_id, socket))
}

async fn run_socket(hub: Hub, peer_id: String, socket: WebSocket) {
    let (sender, receiver) = socket.split();
    let outbound = sender.with(|frame: String| {
        future::ready(Ok::<_, axum::Error>(Message::Text(frame.into())))
    });
    let inbound = receiver.map(|msg| msg.map(incoming));

    if let Err(e) = hub.connect(&peer_id, inbound, outbound).await {
        tracing::info!(peer = %peer_id, error = %e, "connection refused");
    }
}

/// Map a WebSocket message onto the hub's transport-neutral frame.
fn incoming(msg: Message) -> Incoming {
    match msg {
        Message::Text(text) => Incoming::Frame(Bytes::copy_from_slice(text.as_str().as_bytes())),
        Message::Binary(data) => Incoming::Frame(data),
        Message::Ping(_) | Message::Pong(_) => Incoming::Control,
        Message::Close(_) => Incoming::Close,
    }
}
