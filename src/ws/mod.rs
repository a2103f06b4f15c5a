//! WebSocket adapters.
//!
//! The server side mounts a [`ServerEndpoint`] on an axum router; each
//! upgraded socket gets its own read/write task (see [`connection`]). The
//! client side drives a tokio-tungstenite stream for a
//! [`ClientEndpoint`](crate::client::ClientEndpoint).

pub(crate) mod client;
pub mod connection;
pub mod handler;
pub mod health;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::HEALTH_PATH;
use crate::server::ServerEndpoint;

/// Builds the router: the socket at the configured path plus `/health`.
pub fn router(endpoint: ServerEndpoint) -> Router {
    let path = endpoint.config().path.clone();
    Router::new()
        .route(&path, get(handler::ws_handler))
        .route(HEALTH_PATH, get(health::health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(endpoint)
}

/// Serves `endpoint` on `listener` until the server stops.
///
/// Starts the bundle flusher when bundling is enabled and stops it on
/// return.
///
/// # Errors
///
/// Returns the I/O error that stopped the server.
pub async fn serve(listener: TcpListener, endpoint: ServerEndpoint) -> std::io::Result<()> {
    let flusher = endpoint.spawn_flusher();
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(
            %addr,
            path = %endpoint.config().path,
            require_authentication = endpoint.config().require_authentication,
            "socket server listening"
        );
    }

    let result = axum::serve(listener, router(endpoint)).await;

    if let Some(flusher) = flusher {
        flusher.abort();
    }
    result
}
