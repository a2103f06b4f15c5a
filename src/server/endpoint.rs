//! Server endpoint: many connections, one registry.
//!
//! [`ServerEndpoint`] wires transport lifecycle callbacks (`on_connect`,
//! `on_frame`, `on_close`) to the registry, the callback table and the
//! router. It is cheap to clone and may be constructed any number of
//! times per process.
//!
//! # Locking
//!
//! The registry and the callback table each live behind their own mutex.
//! When both are needed the registry lock is taken first. No lock is held
//! while application code (handlers, reply callbacks) runs.
//!
//! # Bundling
//!
//! With bundling enabled every write to a connection (sends, replies,
//! authentication errors, explicit bundles) joins that connection's
//! [`Outbox`], so the peer sees them in call order once flushed.

use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::handshake::Handshake;
use super::message::ServerMessage;
use crate::config::ServerConfig;
use crate::domain::router::{invoke_all, isolate};
use crate::domain::{
    CallbackTable, ConnectionId, ConnectionInfo, ConnectionRecord, ConnectionRegistry,
    ConnectionState, EventBus, EventRouter, Outbox, Reply, ReplyHandler, ServerEvent, User,
    UserId,
};
use crate::error::SocketError;
use crate::protocol::{
    AUTHENTICATE_TYPE, CALLBACK_TYPE, CallbackId, Codec, Envelope, Inbound, SubEnvelope,
};
use crate::transport::FrameSink;

#[derive(Debug)]
struct ServerShared {
    config: ServerConfig,
    codec: Codec,
    registry: Mutex<ConnectionRegistry>,
    callbacks: Mutex<CallbackTable<ConnectionId>>,
    router: RwLock<EventRouter<ServerMessage>>,
    events: EventBus<ServerEvent>,
}

/// Server side of the protocol.
#[derive(Debug, Clone)]
pub struct ServerEndpoint {
    shared: Arc<ServerShared>,
}

impl ServerEndpoint {
    /// Creates an endpoint with no connections and no handlers.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let codec = Codec::new(config.wire_profile);
        let events = EventBus::new(config.event_capacity);
        Self {
            shared: Arc::new(ServerShared {
                config,
                codec,
                registry: Mutex::new(ConnectionRegistry::new()),
                callbacks: Mutex::new(CallbackTable::new()),
                router: RwLock::new(EventRouter::new()),
                events,
            }),
        }
    }

    /// Configuration the endpoint was built with.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// Registers a handler for `message_type`.
    ///
    /// The `authenticate` type receives messages from pending connections;
    /// every other type only sees authenticated traffic.
    pub fn on<F>(&self, message_type: impl Into<String>, handler: F)
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        self.shared.router.write().on(message_type, handler);
    }

    /// Removes every handler for `message_type`.
    pub fn off(&self, message_type: &str) -> usize {
        self.shared.router.write().off(message_type)
    }

    /// Subscribes to connection lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.shared.events.subscribe()
    }

    /// Registers a new transport connection under a fresh id.
    pub fn accept(&self, sink: Arc<dyn FrameSink>) -> ConnectionId {
        let connection_id = ConnectionId::new();
        self.on_connect(connection_id, sink);
        connection_id
    }

    /// Registers a transport connection.
    ///
    /// Returns `Pending` when authentication is required, `Authenticated`
    /// (keyed by the connection id) otherwise. A live connection already
    /// registered under `connection_id` is closed first.
    pub fn on_connect(
        &self,
        connection_id: ConnectionId,
        sink: Arc<dyn FrameSink>,
    ) -> ConnectionState {
        let (state, replaced) = self.shared.registry.lock().on_connect(
            connection_id,
            sink,
            self.shared.config.require_authentication,
        );
        if let Some(old) = replaced {
            self.retire(old, "connection id reused by a new transport");
        }
        tracing::debug!(%connection_id, ?state, "connection opened");
        self.shared
            .events
            .emit(ServerEvent::Connected { connection_id });
        state
    }

    /// Forgets a transport connection and sweeps its pending callbacks.
    ///
    /// Returns `false` if the connection was already gone.
    pub fn on_close(&self, connection_id: ConnectionId) -> bool {
        let Some(record) = self.shared.registry.lock().on_close(connection_id) else {
            return false;
        };
        let swept = self.shared.callbacks.lock().sweep(&connection_id);
        tracing::debug!(
            %connection_id,
            user_id = ?record.user_id,
            swept,
            "connection closed"
        );
        self.shared.events.emit(ServerEvent::Closed {
            connection_id,
            user_id: record.user_id,
        });
        true
    }

    /// Handles one inbound text frame.
    ///
    /// Malformed frames are logged and dropped; the connection stays open.
    pub fn on_frame(&self, connection_id: ConnectionId, frame: &str) {
        let inbound = match self.shared.codec.decode(frame) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!(%connection_id, error = %e, "dropping inbound frame");
                return;
            }
        };
        match inbound {
            Inbound::Message(envelope) => self.process(
                connection_id,
                Some(envelope.message_type),
                envelope.payload,
                envelope.callback_id,
            ),
            Inbound::Bundle(items) => {
                for item in items {
                    self.process(connection_id, item.message_type, item.payload, item.callback_id);
                }
            }
        }
    }

    fn process(
        &self,
        connection_id: ConnectionId,
        message_type: Option<String>,
        payload: Value,
        callback_id: Option<CallbackId>,
    ) {
        let (sink, outbox, user_id) = {
            let registry = self.shared.registry.lock();
            let Some(record) = registry.record_of(connection_id) else {
                tracing::debug!(%connection_id, "frame from unknown connection dropped");
                return;
            };
            (record.sink(), record.outbox(), record.user_id.clone())
        };

        let Some(message_type) = message_type else {
            // Typeless bundle item: only meaningful as a reply.
            match (callback_id, &user_id) {
                (Some(id), Some(_)) => self.resolve(connection_id, id, payload),
                _ => tracing::debug!(%connection_id, "bundle item without type ignored"),
            }
            return;
        };

        if user_id.is_none() && message_type != AUTHENTICATE_TYPE {
            self.reject_unauthenticated(connection_id, &sink, &outbox, &message_type, &payload);
            return;
        }

        if message_type == CALLBACK_TYPE {
            match callback_id {
                Some(id) => self.resolve(connection_id, id, payload),
                None => tracing::debug!(%connection_id, "callback without id ignored"),
            }
            return;
        }

        let reply = if self.shared.config.bundling {
            Reply::queued(callback_id, outbox)
        } else {
            Reply::new(callback_id, sink, self.shared.codec)
        };
        self.route(connection_id, message_type, payload, reply, user_id);
    }

    fn route(
        &self,
        connection_id: ConnectionId,
        message_type: String,
        mut payload: Value,
        reply: Reply,
        user_id: Option<UserId>,
    ) {
        let handshake = if message_type == AUTHENTICATE_TYPE {
            Some(Handshake::new(connection_id, self.clone()))
        } else {
            if let Some(user_id) = &user_id {
                inject_user_id(&mut payload, user_id);
            }
            None
        };

        let message = ServerMessage {
            message_type,
            payload,
            connection_id,
            user_id,
            reply,
            handshake,
        };
        let handlers = self.shared.router.read().handlers(&message.message_type);
        let _ = invoke_all(&handlers, &message.message_type, &message);
    }

    fn reject_unauthenticated(
        &self,
        connection_id: ConnectionId,
        sink: &Arc<dyn FrameSink>,
        outbox: &Outbox,
        message_type: &str,
        payload: &Value,
    ) {
        let mut data = Map::new();
        data.insert("type".to_string(), Value::from("error"));
        data.insert("message".to_string(), Value::from("Not authenticated"));
        if let Some(timestamp) = payload.get("timestamp") {
            data.insert("timestamp".to_string(), timestamp.clone());
        }
        let error = Envelope::new(message_type, Value::Object(data));
        if self.shared.config.bundling {
            outbox.push(SubEnvelope::from(error));
        } else if let Err(e) = sink.write(self.shared.codec.encode(&error)) {
            tracing::debug!(%connection_id, error = %e, "auth error not delivered");
        }
        tracing::debug!(
            %connection_id,
            message_type,
            error = %SocketError::AuthenticationRequired,
            "rejected message from pending connection"
        );
    }

    fn resolve(&self, connection_id: ConnectionId, callback_id: CallbackId, data: Value) {
        let handler = self
            .shared
            .callbacks
            .lock()
            .take_owned(&connection_id, callback_id);
        match handler {
            Some(handler) => {
                let _ = isolate(CALLBACK_TYPE, || handler(data));
            }
            None => {
                tracing::debug!(%connection_id, %callback_id, "reply for unknown callback ignored");
            }
        }
    }

    /// Promotes a pending connection to `user`.
    ///
    /// On success publishes [`ServerEvent::Authenticated`]. If `user.id`
    /// was bound to another connection, that connection is closed.
    /// Returns `false` (and logs) if the connection is not pending.
    pub fn authenticate(&self, connection_id: ConnectionId, user: User) -> bool {
        let outcome = self
            .shared
            .registry
            .lock()
            .promote(connection_id, user.id.clone());
        let displaced = match outcome {
            Ok(displaced) => displaced,
            Err(e) => {
                tracing::warn!(%connection_id, error = %e, "failed to find the connection");
                return false;
            }
        };

        if let Some(old) = displaced {
            self.retire(old, "connection replaced by newer login");
        }

        tracing::info!(%connection_id, user_id = %user.id, "connection authenticated");
        self.shared.events.emit(ServerEvent::Authenticated {
            connection_id,
            user,
            timestamp: Utc::now(),
        });
        true
    }

    /// Closes a record the registry already dropped and reports it.
    fn retire(&self, old: ConnectionRecord, reason: &'static str) {
        old.sink().close();
        let swept = self.shared.callbacks.lock().sweep(&old.connection_id);
        tracing::info!(
            connection_id = %old.connection_id,
            user_id = ?old.user_id,
            swept,
            "{reason}"
        );
        self.shared.events.emit(ServerEvent::Closed {
            connection_id: old.connection_id,
            user_id: old.user_id,
        });
    }

    /// Sends a message to an authenticated user.
    ///
    /// Returns `false` if the user is not connected or `message_type` is
    /// the bundle type.
    pub fn send(&self, user_id: &UserId, message_type: &str, payload: Value) -> bool {
        self.deliver(user_id, Envelope::new(message_type, payload), None)
    }

    /// Sends a request to an authenticated user and registers `on_reply`
    /// for the client's `callback` answer.
    ///
    /// Returns `false`, dropping `on_reply`, under the same conditions as
    /// [`ServerEndpoint::send`].
    ///
    /// The handler is dropped unanswered if the connection closes first.
    pub fn send_with_reply<F>(
        &self,
        user_id: &UserId,
        message_type: &str,
        payload: Value,
        on_reply: F,
    ) -> bool
    where
        F: FnOnce(Value) + Send + 'static,
    {
        self.deliver(
            user_id,
            Envelope::new(message_type, payload),
            Some(Box::new(on_reply)),
        )
    }

    fn deliver(
        &self,
        user_id: &UserId,
        mut envelope: Envelope,
        on_reply: Option<ReplyHandler>,
    ) -> bool {
        if let Err(e) = self.shared.codec.check_type(&envelope.message_type) {
            tracing::warn!(%user_id, error = %e, "message not sent");
            return false;
        }
        let (sink, callback_id) = {
            let registry = self.shared.registry.lock();
            let Some(record) = registry.lookup(user_id) else {
                return false;
            };
            let callback_id = on_reply.map(|handler| {
                self.shared
                    .callbacks
                    .lock()
                    .allocate(record.connection_id, handler)
            });
            if let Some(id) = callback_id {
                envelope = envelope.with_callback(id);
            }
            if self.shared.config.bundling {
                record.enqueue(SubEnvelope::from(envelope));
                return true;
            }
            (record.sink(), callback_id)
        };

        match sink.write(self.shared.codec.encode(&envelope)) {
            Ok(()) => true,
            Err(e) => {
                if let Some(id) = callback_id {
                    let _ = self.shared.callbacks.lock().take(id);
                }
                tracing::debug!(%user_id, error = %e, "message not delivered");
                false
            }
        }
    }

    /// Writes `items` to a user as one bundle frame.
    ///
    /// With bundling enabled the items join the user's outbox instead and
    /// go out with the next flush, behind anything queued earlier.
    pub fn bundle(&self, user_id: &UserId, items: &[SubEnvelope]) -> bool {
        if items.is_empty() {
            return false;
        }
        let Some((sink, outbox)) = self
            .shared
            .registry
            .lock()
            .lookup(user_id)
            .map(|record| (record.sink(), record.outbox()))
        else {
            return false;
        };
        if self.shared.config.bundling {
            outbox.extend(items.iter().cloned());
            return true;
        }
        sink.write(self.shared.codec.encode_bundle(items)).is_ok()
    }

    /// Sends to each listed user; unknown ids are skipped silently.
    ///
    /// Returns the number of users the message was delivered to.
    pub fn broadcast_to(&self, message_type: &str, payload: &Value, user_ids: &[UserId]) -> usize {
        if let Err(e) = self.shared.codec.check_type(message_type) {
            tracing::warn!(error = %e, "broadcast not sent");
            return 0;
        }
        let delivered = user_ids
            .iter()
            .filter(|user_id| self.send(user_id, message_type, payload.clone()))
            .count();
        tracing::debug!(message_type, requested = user_ids.len(), delivered, "broadcast");
        delivered
    }

    /// Sends to every authenticated user.
    pub fn broadcast(&self, message_type: &str, payload: &Value) -> usize {
        let user_ids = self.shared.registry.lock().authenticated_users();
        self.broadcast_to(message_type, payload, &user_ids)
    }

    /// Writes every non-empty outbox, pending connections included, as one
    /// bundle frame.
    ///
    /// Holds the registry lock across the writes, so batches of one
    /// connection never interleave. Returns the number of bundle frames
    /// written.
    pub fn flush(&self) -> usize {
        let registry = self.shared.registry.lock();
        let mut written = 0;
        for record in registry.records() {
            let items = record.take_outbox();
            if items.is_empty() {
                continue;
            }
            match record.sink().write(self.shared.codec.encode_bundle(&items)) {
                Ok(()) => written += 1,
                Err(e) => tracing::debug!(
                    connection_id = %record.connection_id,
                    items = items.len(),
                    error = %e,
                    "bundle not delivered"
                ),
            }
        }
        written
    }

    /// Spawns the periodic outbox flusher when bundling is enabled.
    ///
    /// The task stops once every clone of the endpoint is dropped.
    #[must_use]
    pub fn spawn_flusher(&self) -> Option<JoinHandle<()>> {
        if !self.shared.config.bundling {
            return None;
        }
        let weak: Weak<ServerShared> = Arc::downgrade(&self.shared);
        let period = self.shared.config.bundle_interval;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let _ = Self { shared }.flush();
            }
        }))
    }

    /// Snapshot of the connection bound to `user_id`.
    #[must_use]
    pub fn get_connection(&self, user_id: &UserId) -> Option<ConnectionInfo> {
        self.shared
            .registry
            .lock()
            .lookup(user_id)
            .map(|record| record.info())
    }

    /// State of a live connection, `None` once closed.
    #[must_use]
    pub fn connection_state(&self, connection_id: ConnectionId) -> Option<ConnectionState> {
        self.shared.registry.lock().state_of(connection_id)
    }

    /// Number of connections waiting for the handshake.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.registry.lock().pending_len()
    }

    /// Number of authenticated connections.
    #[must_use]
    pub fn authenticated_count(&self) -> usize {
        self.shared.registry.lock().authenticated_len()
    }

    /// Number of server-initiated requests awaiting a reply.
    #[must_use]
    pub fn pending_callbacks(&self) -> usize {
        self.shared.callbacks.lock().len()
    }
}

/// Overwrites `payload.user_id` with the transport-authoritative id.
///
/// Non-object payloads other than `null` are left untouched; handlers
/// should read [`ServerMessage::user_id`] for those.
fn inject_user_id(payload: &mut Value, user_id: &UserId) {
    match payload {
        Value::Object(map) => {
            map.insert("user_id".to_string(), user_id.to_value());
        }
        Value::Null => {
            let mut map = Map::new();
            map.insert("user_id".to_string(), user_id.to_value());
            *payload = Value::Object(map);
        }
        _ => {}
    }
}
