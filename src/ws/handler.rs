//! Axum WebSocket upgrade handler.

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;

use super::connection::run_connection;
use crate::server::ServerEndpoint;

/// `GET <path>`: upgrade the HTTP connection to a protocol socket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(endpoint): State<ServerEndpoint>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_connection(socket, endpoint))
}
