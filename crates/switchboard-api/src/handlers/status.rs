//! /peers: who is connected right now.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::ApiState;

#[derive(Serialize)]
pub struct PeersResponse {
    pub peers: Vec<PeerInfo>,
    pub count: usize,
}

#[derive(Serialize)]
pub struct PeerInfo {
    pub peer_id: String,
    pub connected_secs: u64,
}

pub async fn handle_peers(State(state): State<ApiState>) -> Json<PeersResponse> {
    let peers: Vec<PeerInfo> = state
        .hub
        .registry()
        .peers()
        .into_iter()
        .map(|(peer_id, connected)| PeerInfo {
            peer_id,
            connected_secs: connected.as_secs(),
        })
        .collect();

    Json(PeersResponse {
        count: peers.len(),
        peers,
    })
}
