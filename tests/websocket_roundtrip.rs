//! End-to-end tests over real sockets: an axum server and a
//! tokio-tungstenite client on an ephemeral port.

#![allow(clippy::panic)]

use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

use sockwrap::client::{ClientEndpoint, ClientMessage};
use sockwrap::config::{ClientConfig, ServerConfig};
use sockwrap::domain::{ClientEvent, ServerEvent, User, UserId};
use sockwrap::server::{ServerEndpoint, ServerMessage};

const WAIT: Duration = Duration::from_secs(5);
const TOKEN: &str = "my_token";

async fn start_server() -> (ServerEndpoint, u16) {
    let endpoint = ServerEndpoint::new(ServerConfig::default().with_authentication(true));
    endpoint.on("authenticate", |msg: &ServerMessage| {
        let accepted = msg.payload.get("token") == Some(&json!(TOKEN));
        if accepted && msg.authenticate(User::new(1_i64)) {
            let _ = msg.reply(json!({ "result": true }));
        } else {
            let _ = msg.reply(json!({ "result": false, "message": "Invalid token" }));
        }
    });
    endpoint.on("ping", |msg: &ServerMessage| {
        let _ = msg.reply(json!({ "pong": true, "user_id": msg.payload.get("user_id") }));
    });

    let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind ephemeral port");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("local addr");
    };
    tokio::spawn(sockwrap::ws::serve(listener, endpoint.clone()));
    (endpoint, addr.port())
}

async fn next_client_event<F>(events: &mut broadcast::Receiver<ClientEvent>, wanted: F) -> ClientEvent
where
    F: Fn(&ClientEvent) -> bool,
{
    loop {
        let Ok(Ok(event)) = timeout(WAIT, events.recv()).await else {
            panic!("client event not received");
        };
        if wanted(&event) {
            return event;
        }
    }
}

async fn connected_client(port: u16) -> (ClientEndpoint, broadcast::Receiver<ClientEvent>) {
    let client = ClientEndpoint::new(ClientConfig::new("127.0.0.1", port));
    let mut events = client.subscribe();
    tokio_test::assert_ok!(client.start().await);
    let _ = next_client_event(&mut events, |e| *e == ClientEvent::Connected).await;
    (client, events)
}

async fn authenticated_client(port: u16) -> (ClientEndpoint, broadcast::Receiver<ClientEvent>) {
    let (client, mut events) = connected_client(port).await;
    tokio_test::assert_ok!(client.authenticate(TOKEN));
    let ClientEvent::Authenticated(data) =
        next_client_event(&mut events, |e| matches!(e, ClientEvent::Authenticated(_))).await
    else {
        panic!("expected authenticated event");
    };
    assert_eq!(data, json!({ "result": true }));
    (client, events)
}

#[tokio::test]
async fn handshake_then_request_reply() {
    let (server, port) = start_server().await;
    let (client, _events) = authenticated_client(port).await;

    assert!(client.is_authenticated());
    assert_eq!(server.authenticated_count(), 1);
    assert!(server.get_connection(&UserId::from(1_i64)).is_some());

    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    tokio_test::assert_ok!(client.send_with_reply("ping", json!({ "user_id": 42 }), move |data| {
        let _ = tx.send(data);
    }));
    let Ok(Some(answer)) = timeout(WAIT, rx.recv()).await else {
        panic!("ping reply not received");
    };
    assert_eq!(answer, json!({ "pong": true, "user_id": 1 }));
    assert_eq!(client.pending_callbacks(), 0);
}

#[tokio::test]
async fn rejected_token_stays_pending() {
    let (server, port) = start_server().await;
    let (client, mut events) = connected_client(port).await;

    tokio_test::assert_ok!(client.authenticate("wrong"));
    let ClientEvent::Authenticated(data) =
        next_client_event(&mut events, |e| matches!(e, ClientEvent::Authenticated(_))).await
    else {
        panic!("expected authenticated event");
    };

    assert_eq!(data.get("result"), Some(&json!(false)));
    assert!(!client.is_authenticated());
    assert_eq!(server.pending_count(), 1);
    assert_eq!(server.authenticated_count(), 0);
}

#[tokio::test]
async fn unauthenticated_request_gets_error_envelope() {
    let (_server, port) = start_server().await;
    let (client, _events) = connected_client(port).await;

    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    client.on("ping", move |msg: &ClientMessage| {
        let _ = tx.send(msg.payload.clone());
    });
    tokio_test::assert_ok!(client.send_with_reply("ping", json!({}), |_| {}));

    let Ok(Some(error)) = timeout(WAIT, rx.recv()).await else {
        panic!("error envelope not received");
    };
    assert_eq!(error.get("type"), Some(&json!("error")));
    assert_eq!(error.get("message"), Some(&json!("Not authenticated")));
}

#[tokio::test]
async fn server_push_and_server_request() {
    let (server, port) = start_server().await;
    let (client, _events) = authenticated_client(port).await;
    let user = UserId::from(1_i64);

    let (news_tx, mut news_rx) = mpsc::unbounded_channel::<Value>();
    client.on("news", move |msg: &ClientMessage| {
        let _ = news_tx.send(msg.payload.clone());
    });
    client.on("confirm", |msg: &ClientMessage| {
        let _ = msg.reply(json!({ "confirmed": true }));
    });

    assert!(server.send(&user, "news", json!({ "headline": "hello" })));
    let Ok(Some(news)) = timeout(WAIT, news_rx.recv()).await else {
        panic!("news not received");
    };
    assert_eq!(news, json!({ "headline": "hello" }));

    let (answer_tx, mut answer_rx) = mpsc::unbounded_channel::<Value>();
    assert!(server.send_with_reply(&user, "confirm", json!({}), move |data| {
        let _ = answer_tx.send(data);
    }));
    let Ok(Some(answer)) = timeout(WAIT, answer_rx.recv()).await else {
        panic!("client answer not received");
    };
    assert_eq!(answer, json!({ "confirmed": true }));
    assert_eq!(server.pending_callbacks(), 0);
}

#[tokio::test]
async fn client_disconnect_closes_server_connection() {
    let (server, port) = start_server().await;
    let mut server_events = server.subscribe();
    let (client, mut events) = authenticated_client(port).await;

    assert!(client.disconnect());
    let _ = next_client_event(&mut events, |e| *e == ClientEvent::Closed).await;

    loop {
        let Ok(Ok(event)) = timeout(WAIT, server_events.recv()).await else {
            panic!("server close event not received");
        };
        if let ServerEvent::Closed { user_id, .. } = event {
            assert_eq!(user_id, Some(UserId::from(1_i64)));
            break;
        }
    }
    assert_eq!(server.authenticated_count(), 0);
    assert!(!server.send(&UserId::from(1_i64), "news", json!({})));
}
