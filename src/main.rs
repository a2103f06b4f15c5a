//! sockwrap demo server.
//!
//! Serves the socket endpoint with a token-checking `authenticate` handler
//! and a `ping` handler. The accepted token comes from
//! `SOCKWRAP_DEMO_TOKEN` (default `my_token`). `SOCKWRAP_LOG_FORMAT=json`
//! switches log output to one JSON object per line.

use serde_json::json;
use tracing_subscriber::EnvFilter;

use sockwrap::config::ServerConfig;
use sockwrap::domain::{ServerEvent, User};
use sockwrap::server::{ServerEndpoint, ServerMessage};

const DEMO_USER_ID: i64 = 1;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json_logs(std::env::var("SOCKWRAP_LOG_FORMAT").ok().as_deref()) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load configuration
    let config = ServerConfig::from_env()?;
    let addr = config.listen_addr()?;
    let token = std::env::var("SOCKWRAP_DEMO_TOKEN").unwrap_or_else(|_| "my_token".to_string());
    tracing::info!(%addr, path = %config.path, "starting sockwrap-server");

    let endpoint = ServerEndpoint::new(config);

    endpoint.on("authenticate", move |msg: &ServerMessage| {
        let accepted = msg.payload.get("token").and_then(|t| t.as_str()) == Some(token.as_str());
        if accepted && msg.authenticate(User::new(DEMO_USER_ID)) {
            let _ = msg.reply(json!({ "result": true }));
        } else {
            tracing::warn!(connection_id = %msg.connection_id, "authentication rejected");
            let _ = msg.reply(json!({ "result": false, "message": "Invalid token" }));
        }
    });

    endpoint.on("ping", |msg: &ServerMessage| {
        let _ = msg.reply(json!({
            "pong": true,
            "user_id": msg.payload.get("user_id"),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));
    });

    // Log lifecycle events
    let mut events = endpoint.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match &event {
                ServerEvent::Authenticated { user, .. } => {
                    tracing::info!(user_id = %user.id, "user authenticated");
                }
                other => tracing::debug!(event = other.event_type_str(), "lifecycle event"),
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    sockwrap::ws::serve(listener, endpoint).await?;

    Ok(())
}

/// `SOCKWRAP_LOG_FORMAT=json` selects the JSON formatter.
fn json_logs(format: Option<&str>) -> bool {
    format.is_some_and(|format| format.eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_switch() {
        assert!(json_logs(Some("json")));
        assert!(json_logs(Some("JSON")));
        assert!(!json_logs(Some("pretty")));
        assert!(!json_logs(None));
    }
}
