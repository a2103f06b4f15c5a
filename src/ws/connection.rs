//! Read/write loop for one server-side socket.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};

use crate::server::ServerEndpoint;
use crate::transport::{ChannelSink, Outbound};

/// Runs one connection from upgrade to close.
///
/// - Registers the socket with the endpoint through a [`ChannelSink`].
/// - Feeds every text frame to [`ServerEndpoint::on_frame`].
/// - Writes whatever the endpoint queues, closing when asked to.
///
/// The endpoint is told about the close however the loop ends.
pub async fn run_connection(socket: WebSocket, endpoint: ServerEndpoint) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (sink, mut outbound) = ChannelSink::channel();
    let connection_id = endpoint.accept(Arc::new(sink));

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        endpoint.on_frame(connection_id, text.as_str());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(%connection_id, error = %e, "socket read failed");
                        break;
                    }
                    _ => {}
                }
            }
            out = outbound.recv() => {
                match out {
                    Some(Outbound::Frame(frame)) => {
                        if ws_tx.send(Message::text(frame)).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }

    endpoint.on_close(connection_id);
    tracing::debug!(%connection_id, "ws connection closed");
}
