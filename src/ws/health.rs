//! `GET /health`.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use serde::Serialize;

use crate::server::ServerEndpoint;

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    version: &'static str,
    pending_connections: usize,
    authenticated_connections: usize,
}

/// Service status and connection counts.
pub async fn health_handler(State(endpoint): State<ServerEndpoint>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION"),
            pending_connections: endpoint.pending_count(),
            authenticated_connections: endpoint.authenticated_count(),
        }),
    )
}
