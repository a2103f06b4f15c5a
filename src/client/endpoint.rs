//! Client endpoint: one connection to one server.
//!
//! [`ClientEndpoint`] owns the client's callback table and router. The
//! WebSocket transport is opened by [`ClientEndpoint::start`]; embedding
//! applications (and tests) can instead [`attach`](ClientEndpoint::attach)
//! any [`FrameSink`] and feed inbound frames through
//! [`on_frame`](ClientEndpoint::on_frame).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};
use tokio::sync::broadcast;

use super::message::ClientMessage;
use crate::config::ClientConfig;
use crate::domain::router::{invoke_all, isolate};
use crate::domain::{CallbackTable, ClientEvent, EventBus, EventRouter, Reply};
use crate::error::SocketError;
use crate::protocol::{AUTHENTICATE_TYPE, CALLBACK_TYPE, CallbackId, Codec, Envelope, Inbound};
use crate::transport::{ChannelSink, FrameSink};

#[derive(Debug)]
struct Attached {
    session: u64,
    sink: Arc<dyn FrameSink>,
}

#[derive(Debug)]
struct ClientShared {
    config: ClientConfig,
    codec: Codec,
    transport: Mutex<Option<Attached>>,
    sessions: AtomicU64,
    callbacks: Mutex<CallbackTable>,
    router: RwLock<EventRouter<ClientMessage>>,
    authenticated: AtomicBool,
    events: EventBus<ClientEvent>,
}

/// Client side of the protocol.
#[derive(Debug, Clone)]
pub struct ClientEndpoint {
    shared: Arc<ClientShared>,
}

impl ClientEndpoint {
    /// Creates a disconnected endpoint.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let codec = Codec::new(config.wire_profile);
        let events = EventBus::new(config.event_capacity);
        Self {
            shared: Arc::new(ClientShared {
                config,
                codec,
                transport: Mutex::new(None),
                sessions: AtomicU64::new(0),
                callbacks: Mutex::new(CallbackTable::new()),
                router: RwLock::new(EventRouter::new()),
                authenticated: AtomicBool::new(false),
                events,
            }),
        }
    }

    /// Configuration the endpoint was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Registers a handler for messages of `message_type`.
    pub fn on<F>(&self, message_type: impl Into<String>, handler: F)
    where
        F: Fn(&ClientMessage) + Send + Sync + 'static,
    {
        self.shared.router.write().on(message_type, handler);
    }

    /// Removes every handler for `message_type`.
    pub fn off(&self, message_type: &str) -> usize {
        self.shared.router.write().off(message_type)
    }

    /// Subscribes to connection lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    /// Opens the WebSocket transport and spawns its socket task.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::TransportUnavailable`] if url or port is
    /// missing or the connection cannot be opened, and
    /// [`SocketError::Config`] for an invalid path. A
    /// [`ClientEvent::Failure`] is published before returning either.
    pub async fn start(&self) -> Result<(), SocketError> {
        let url = self
            .shared
            .config
            .endpoint_url()
            .map_err(|e| self.fail(e))?;
        tracing::info!(%url, "starting socket interface");

        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| self.fail(SocketError::TransportUnavailable(e.to_string())))?;

        let (sink, outbound) = ChannelSink::channel();
        let session = self.attach(Arc::new(sink));
        tokio::spawn(crate::ws::client::run_client(
            stream,
            outbound,
            self.clone(),
            session,
        ));
        Ok(())
    }

    fn fail(&self, error: SocketError) -> SocketError {
        tracing::error!(error = %error, "socket interface not started");
        self.shared
            .events
            .emit(ClientEvent::Failure(error.to_string()));
        error
    }

    /// Installs `sink` as the live transport and publishes
    /// [`ClientEvent::Connected`].
    ///
    /// A previously attached transport is closed first. Returns the
    /// session number to pass to [`ClientEndpoint::detach`].
    pub fn attach(&self, sink: Arc<dyn FrameSink>) -> u64 {
        let session = self.shared.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = self
            .shared
            .transport
            .lock()
            .replace(Attached { session, sink });
        if let Some(previous) = previous {
            previous.sink.close();
            self.closed(previous.session);
        }
        tracing::debug!(session, "transport attached");
        self.shared.events.emit(ClientEvent::Connected);
        session
    }

    /// Reports that the transport of `session` closed on its own.
    ///
    /// Ignored if that session was already replaced or disconnected.
    pub fn detach(&self, session: u64) -> bool {
        let detached = {
            let mut transport = self.shared.transport.lock();
            if transport.as_ref().is_some_and(|t| t.session == session) {
                transport.take()
            } else {
                None
            }
        };
        match detached {
            Some(attached) => {
                self.closed(attached.session);
                true
            }
            None => false,
        }
    }

    /// Forces the transport closed.
    ///
    /// Returns `false` if there was no live transport.
    pub fn disconnect(&self) -> bool {
        let attached = self.shared.transport.lock().take();
        match attached {
            Some(attached) => {
                attached.sink.close();
                self.closed(attached.session);
                true
            }
            None => false,
        }
    }

    fn closed(&self, session: u64) {
        let swept = self.shared.callbacks.lock().clear();
        self.shared.authenticated.store(false, Ordering::SeqCst);
        tracing::debug!(session, swept, "transport closed");
        self.shared.events.emit(ClientEvent::Closed);
    }

    /// Returns `true` while a transport is attached.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.transport.lock().is_some()
    }

    /// Returns `true` once the server accepted `authenticate`.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.shared.authenticated.load(Ordering::SeqCst)
    }

    /// Number of requests awaiting a reply.
    #[must_use]
    pub fn pending_callbacks(&self) -> usize {
        self.shared.callbacks.lock().len()
    }

    fn sink(&self) -> Result<Arc<dyn FrameSink>, SocketError> {
        self.shared
            .transport
            .lock()
            .as_ref()
            .map(|attached| Arc::clone(&attached.sink))
            .ok_or(SocketError::ConnectionClosed)
    }

    /// Sends a message that expects no reply.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::ConnectionClosed`] without a live transport
    /// and [`SocketError::ReservedType`] for the bundle type.
    pub fn send(&self, message_type: &str, payload: Value) -> Result<(), SocketError> {
        self.shared.codec.check_type(message_type)?;
        let sink = self.sink()?;
        sink.write(
            self.shared
                .codec
                .encode(&Envelope::new(message_type, payload)),
        )
    }

    /// Sends a request and registers `on_reply` for the server's answer.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::ConnectionClosed`] without a live transport
    /// and [`SocketError::ReservedType`] for the bundle type; no callback is
    /// left registered in either case.
    pub fn send_with_reply<F>(
        &self,
        message_type: &str,
        payload: Value,
        on_reply: F,
    ) -> Result<CallbackId, SocketError>
    where
        F: FnOnce(Value) + Send + 'static,
    {
        self.shared.codec.check_type(message_type)?;
        let sink = self.sink()?;
        let callback_id = self
            .shared
            .callbacks
            .lock()
            .allocate((), Box::new(on_reply));
        let frame = self
            .shared
            .codec
            .encode(&Envelope::new(message_type, payload).with_callback(callback_id));
        if let Err(e) = sink.write(frame) {
            let _ = self.shared.callbacks.lock().take(callback_id);
            return Err(e);
        }
        Ok(callback_id)
    }

    /// Sends `{type: "authenticate", data: {token}}`.
    ///
    /// When the server answers, the local authenticated flag is set if the
    /// answer's `result` is truthy, and [`ClientEvent::Authenticated`] is
    /// published with the answer either way.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::ConnectionClosed`] without a live transport.
    pub fn authenticate(&self, token: impl Into<Value>) -> Result<CallbackId, SocketError> {
        let token: Value = token.into();
        let shared = Arc::downgrade(&self.shared);
        self.send_with_reply(AUTHENTICATE_TYPE, json!({ "token": token }), move |data| {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            if data.get("result").is_some_and(is_truthy) {
                shared.authenticated.store(true, Ordering::SeqCst);
            }
            shared.events.emit(ClientEvent::Authenticated(data));
        })
    }

    /// Handles one inbound text frame.
    ///
    /// A top-level `callback` resolves the matching request; any other type
    /// is routed, with a live [`Reply`] if the server sent a `callback_id`.
    /// Bundle items resolve their `callback_id` first and are then routed
    /// if they carry a type.
    pub fn on_frame(&self, frame: &str) {
        let inbound = match self.shared.codec.decode(frame) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!(error = %e, "dropping inbound frame");
                return;
            }
        };
        let Ok(sink) = self.sink() else {
            tracing::debug!("frame received without a transport");
            return;
        };
        let codec = self.shared.codec;

        match inbound {
            Inbound::Message(envelope) => {
                let request_id = if envelope.message_type == CALLBACK_TYPE {
                    if let Some(id) = envelope.callback_id {
                        self.resolve(id, envelope.payload.clone());
                    }
                    None
                } else {
                    envelope.callback_id
                };
                self.dispatch(
                    envelope.message_type,
                    envelope.payload,
                    Reply::new(request_id, sink, codec),
                );
            }
            Inbound::Bundle(items) => {
                for item in items {
                    if let Some(id) = item.callback_id {
                        self.resolve(id, item.payload.clone());
                    }
                    if let Some(message_type) = item.message_type {
                        self.dispatch(
                            message_type,
                            item.payload,
                            Reply::new(None, Arc::clone(&sink), codec),
                        );
                    }
                }
            }
        }
    }

    fn resolve(&self, callback_id: CallbackId, data: Value) {
        let handler = self.shared.callbacks.lock().take(callback_id);
        match handler {
            Some(handler) => {
                let _ = isolate(CALLBACK_TYPE, || handler(data));
            }
            None => tracing::debug!(%callback_id, "reply for unknown callback ignored"),
        }
    }

    fn dispatch(&self, message_type: String, payload: Value, reply: Reply) {
        let message = ClientMessage {
            message_type,
            payload,
            reply,
        };
        let handlers = self.shared.router.read().handlers(&message.message_type);
        let _ = invoke_all(&handlers, &message.message_type, &message);
    }
}

/// Truthiness of a JSON value as the server's `result` flag.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::transport::MemorySink;

    fn attached_client() -> (ClientEndpoint, Arc<MemorySink>) {
        let client = ClientEndpoint::new(ClientConfig::new("localhost", 9876));
        let sink = MemorySink::new();
        let _ = client.attach(Arc::clone(&sink) as Arc<dyn FrameSink>);
        (client, sink)
    }

    fn frames(sink: &MemorySink) -> Vec<Value> {
        sink.drain()
            .iter()
            .filter_map(|f| serde_json::from_str(f).ok())
            .collect()
    }

    #[tokio::test]
    async fn authenticate_round_trip_sets_flag() {
        let (client, sink) = attached_client();
        let mut events = client.subscribe();

        let Ok(id) = client.authenticate("T") else {
            panic!("authenticate should send");
        };
        assert_eq!(id.get(), 1);
        assert_eq!(
            frames(&sink),
            vec![json!({"type": "authenticate", "data": {"token": "T"}, "callback_id": 1})]
        );
        assert!(!client.is_authenticated());

        client.on_frame(r#"{"type":"callback","data":{"result":true},"callback_id":1}"#);

        assert!(client.is_authenticated());
        assert_eq!(client.pending_callbacks(), 0);
        let Ok(ClientEvent::Authenticated(data)) = events.recv().await else {
            panic!("expected authenticated event");
        };
        assert_eq!(data, json!({"result": true}));
    }

    #[tokio::test]
    async fn rejected_authentication_still_publishes() {
        let (client, _sink) = attached_client();
        let mut events = client.subscribe();
        let _ = client.authenticate("bad");

        client.on_frame(
            r#"{"type":"callback","data":{"result":false,"message":"nope"},"callback_id":1}"#,
        );

        assert!(!client.is_authenticated());
        let Ok(ClientEvent::Authenticated(data)) = events.recv().await else {
            panic!("expected authenticated event");
        };
        assert_eq!(data.get("message"), Some(&json!("nope")));
    }

    #[test]
    fn reply_resolves_once() {
        let (client, _sink) = attached_client();
        let answers = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&answers);
        let Ok(id) = client.send_with_reply("question", json!({}), move |data| {
            record.lock().push(data);
        }) else {
            panic!("send should succeed");
        };

        let reply = format!(r#"{{"type":"callback","data":"x","callback_id":{id}}}"#);
        client.on_frame(&reply);
        client.on_frame(&reply);

        assert_eq!(*answers.lock(), vec![json!("x")]);
    }

    #[test]
    fn bundle_resolves_and_dispatches_independently() {
        let (client, _sink) = attached_client();
        let dispatched = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&dispatched);
        client.on("a", move |msg: &ClientMessage| {
            assert_eq!(msg.payload, json!({}));
            seen.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 1..=5 {
            assert!(client.send_with_reply("q", json!(null), |_| {}).is_ok());
        }
        let sixth = Arc::new(Mutex::new(None));
        let record = Arc::clone(&sixth);
        let Ok(id) = client.send_with_reply("q", json!(null), move |data| {
            *record.lock() = Some(data);
            panic!("callback failure");
        }) else {
            panic!("send should succeed");
        };
        assert_eq!(id.get(), 6);

        client.on_frame(
            r#"{"type":"bundle","data":[{"type":"a","data":{},"callback_id":5},{"callback_id":6}]}"#,
        );

        assert_eq!(dispatched.load(Ordering::SeqCst), 1);
        assert_eq!(*sixth.lock(), Some(json!({})));
        assert_eq!(client.pending_callbacks(), 4);
    }

    #[test]
    fn server_request_gets_live_reply() {
        let (client, sink) = attached_client();
        client.on("confirm", |msg: &ClientMessage| {
            let _ = msg.reply(json!({"ok": true}));
        });

        client.on_frame(r#"{"type":"confirm","data":{},"callback_id":3}"#);

        assert_eq!(
            frames(&sink),
            vec![json!({"type": "callback", "data": {"ok": true}, "callback_id": 3})]
        );
    }

    #[test]
    fn plain_message_reply_is_stubbed() {
        let (client, sink) = attached_client();
        let outcome = Arc::new(Mutex::new(None));
        let record = Arc::clone(&outcome);
        client.on("news", move |msg: &ClientMessage| {
            *record.lock() = Some(msg.reply(json!("thanks")));
        });

        client.on_frame(r#"{"type":"news","data":{"headline":"x"}}"#);

        assert_eq!(*outcome.lock(), Some(false));
        assert!(sink.frames().is_empty());
    }

    #[tokio::test]
    async fn disconnect_sweeps_and_resets() {
        let (client, sink) = attached_client();
        let _ = client.authenticate("T");
        client.on_frame(r#"{"type":"callback","data":{"result":true},"callback_id":1}"#);
        let _ = client.send_with_reply("q", json!(null), |_| {});
        let mut events = client.subscribe();

        assert!(client.disconnect());
        assert!(sink.is_closed());
        assert!(!client.is_connected());
        assert!(!client.is_authenticated());
        assert_eq!(client.pending_callbacks(), 0);
        assert!(!client.disconnect());
        assert_eq!(events.recv().await.ok(), Some(ClientEvent::Closed));

        assert_eq!(
            client.send("late", json!(null)),
            Err(SocketError::ConnectionClosed)
        );
    }

    #[test]
    fn stale_session_cannot_detach_new_transport() {
        let (client, _first) = attached_client();
        let second = MemorySink::new();
        let session = client.attach(Arc::clone(&second) as Arc<dyn FrameSink>);

        assert!(!client.detach(session - 1));
        assert!(client.is_connected());
        assert!(client.detach(session));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn start_without_port_fails_with_event() {
        let client = ClientEndpoint::new(ClientConfig::default());
        let mut events = client.subscribe();

        let result = client.start().await;

        assert!(matches!(result, Err(SocketError::TransportUnavailable(_))));
        let Ok(ClientEvent::Failure(reason)) = events.recv().await else {
            panic!("expected failure event");
        };
        assert!(reason.contains("url or port"));
    }

    #[test]
    fn truthiness_follows_json_values() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("yes")));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&Value::Null));
    }

    #[test]
    fn bundle_type_cannot_be_sent() {
        let (client, sink) = attached_client();

        assert_eq!(
            client.send("bundle", json!({"x": 1})),
            Err(SocketError::ReservedType("bundle".to_string()))
        );
        let result = client.send_with_reply("bundle", json!({}), |_| {});
        assert_eq!(result, Err(SocketError::ReservedType("bundle".to_string())));

        assert_eq!(client.pending_callbacks(), 0);
        assert!(sink.frames().is_empty());
        tokio_test::assert_ok!(client.send("bundles", json!(null)));
    }
}
