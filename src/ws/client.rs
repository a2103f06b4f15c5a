//! Read/write loop for the client socket.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::client::ClientEndpoint;
use crate::transport::Outbound;

/// Drives `stream` for transport `session` until either side closes.
pub(crate) async fn run_client(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    endpoint: ClientEndpoint,
    session: u64,
) {
    let (mut ws_tx, mut ws_rx) = stream.split();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => endpoint.on_frame(text.as_str()),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::warn!(session, error = %e, "socket read failed");
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

    let _ = endpoint.detach(session);
    tracing::debug!(session, "client socket closed");
}
