//! Connection bookkeeping for the server endpoint.
//!
//! [`ConnectionRegistry`] holds every live connection in exactly one of two
//! indexes: `pending` (keyed by [`ConnectionId`]) until the handshake
//! succeeds, then `authenticated` (keyed by [`UserId`]). A reverse map from
//! connection id to user id lets close events find authenticated records.
//!
//! # Concurrency
//!
//! The registry is a plain data structure. The server endpoint keeps it
//! behind a single mutex so that every transition is serialized.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{ConnectionId, Outbox, UserId};
use crate::error::SocketError;
use crate::protocol::SubEnvelope;
use crate::transport::FrameSink;

/// Lifecycle state of a connection.
///
/// ```text
/// Pending ──promote──▶ Authenticated
///    │                      │
///    └──────close──▶ Closed ◀┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Connected, handshake not completed.
    Pending,
    /// Bound to a user id.
    Authenticated,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    /// Returns `true` if `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Authenticated)
                | (Self::Pending, Self::Closed)
                | (Self::Authenticated, Self::Closed)
        )
    }
}

/// One live transport connection.
#[derive(Debug)]
pub struct ConnectionRecord {
    /// Transport-assigned id.
    pub connection_id: ConnectionId,
    /// Bound identity once authenticated.
    pub user_id: Option<UserId>,
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// When the transport accepted the connection.
    pub connected_at: DateTime<Utc>,
    /// When the handshake completed.
    pub authenticated_at: Option<DateTime<Utc>>,
    sink: Arc<dyn FrameSink>,
    outbox: Outbox,
}

impl ConnectionRecord {
    fn new(connection_id: ConnectionId, sink: Arc<dyn FrameSink>) -> Self {
        Self {
            connection_id,
            user_id: None,
            state: ConnectionState::Pending,
            connected_at: Utc::now(),
            authenticated_at: None,
            sink,
            outbox: Outbox::new(),
        }
    }

    fn transition(&mut self, next: ConnectionState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            tracing::warn!(
                connection_id = %self.connection_id,
                from = ?self.state,
                to = ?next,
                "illegal connection state transition ignored"
            );
            false
        }
    }

    /// Write/close capability of the connection.
    #[must_use]
    pub fn sink(&self) -> Arc<dyn FrameSink> {
        Arc::clone(&self.sink)
    }

    /// Shared handle to the connection's bundle queue.
    #[must_use]
    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    /// Queues a bundle item for the next flush.
    pub fn enqueue(&self, item: SubEnvelope) {
        self.outbox.push(item);
    }

    /// Takes every queued bundle item.
    pub fn take_outbox(&self) -> Vec<SubEnvelope> {
        self.outbox.take()
    }

    /// Number of queued bundle items.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.outbox.len()
    }

    /// Snapshot suitable for handing out of the registry lock.
    #[must_use]
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            connection_id: self.connection_id,
            user_id: self.user_id.clone(),
            state: self.state,
            connected_at: self.connected_at,
            authenticated_at: self.authenticated_at,
        }
    }
}

/// Read-only view of a [`ConnectionRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    /// Transport-assigned id.
    pub connection_id: ConnectionId,
    /// Bound identity once authenticated.
    pub user_id: Option<UserId>,
    /// Lifecycle state at snapshot time.
    pub state: ConnectionState,
    /// When the transport accepted the connection.
    pub connected_at: DateTime<Utc>,
    /// When the handshake completed.
    pub authenticated_at: Option<DateTime<Utc>>,
}

/// Pending and authenticated connection indexes.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    pending: HashMap<ConnectionId, ConnectionRecord>,
    authenticated: HashMap<UserId, ConnectionRecord>,
    users: HashMap<ConnectionId, UserId>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly accepted connection.
    ///
    /// Without `require_authentication` the record is promoted immediately
    /// with the connection id as its user id.
    ///
    /// A live record already registered under `connection_id` is removed
    /// and returned (in state `Closed`) so the caller can close its
    /// transport.
    pub fn on_connect(
        &mut self,
        connection_id: ConnectionId,
        sink: Arc<dyn FrameSink>,
        require_authentication: bool,
    ) -> (ConnectionState, Option<ConnectionRecord>) {
        let replaced = self.on_close(connection_id);
        let record = ConnectionRecord::new(connection_id, sink);
        if require_authentication {
            self.pending.insert(connection_id, record);
            (ConnectionState::Pending, replaced)
        } else {
            let displaced = self.bind(record, UserId::from(connection_id));
            (ConnectionState::Authenticated, replaced.or(displaced))
        }
    }

    /// Removes the connection from whichever index holds it.
    ///
    /// Returns the closed record, or `None` if the connection was unknown
    /// (already closed or displaced). Idempotent.
    pub fn on_close(&mut self, connection_id: ConnectionId) -> Option<ConnectionRecord> {
        let mut record = match self.pending.remove(&connection_id) {
            Some(record) => record,
            None => {
                let user_id = self.users.remove(&connection_id)?;
                self.authenticated.remove(&user_id)?
            }
        };
        record.transition(ConnectionState::Closed);
        Some(record)
    }

    /// Moves a pending connection to the authenticated index under `user_id`.
    ///
    /// If another connection was already bound to `user_id` it is removed
    /// and returned (in state `Closed`) so the caller can close its
    /// transport.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::HandshakeNotFound`] if `connection_id` is not
    /// pending; the registry is left unchanged.
    pub fn promote(
        &mut self,
        connection_id: ConnectionId,
        user_id: UserId,
    ) -> Result<Option<ConnectionRecord>, SocketError> {
        let record = self
            .pending
            .remove(&connection_id)
            .ok_or(SocketError::HandshakeNotFound(connection_id))?;
        Ok(self.bind(record, user_id))
    }

    fn bind(&mut self, mut record: ConnectionRecord, user_id: UserId) -> Option<ConnectionRecord> {
        record.transition(ConnectionState::Authenticated);
        record.user_id = Some(user_id.clone());
        record.authenticated_at = Some(Utc::now());
        self.users.insert(record.connection_id, user_id.clone());

        let mut displaced = self.authenticated.insert(user_id, record)?;
        self.users.remove(&displaced.connection_id);
        displaced.transition(ConnectionState::Closed);
        Some(displaced)
    }

    /// Returns the authenticated connection bound to `user_id`.
    #[must_use]
    pub fn lookup(&self, user_id: &UserId) -> Option<&ConnectionRecord> {
        self.authenticated.get(user_id)
    }

    /// Returns the user bound to `connection_id`, if authenticated.
    #[must_use]
    pub fn user_of(&self, connection_id: ConnectionId) -> Option<&UserId> {
        self.users.get(&connection_id)
    }

    /// Returns the state of a live connection, or `None` if unknown.
    #[must_use]
    pub fn state_of(&self, connection_id: ConnectionId) -> Option<ConnectionState> {
        if self.pending.contains_key(&connection_id) {
            Some(ConnectionState::Pending)
        } else {
            self.user_of(connection_id)
                .and_then(|user_id| self.authenticated.get(user_id))
                .map(|record| record.state)
        }
    }

    /// Returns a live connection in either index.
    #[must_use]
    pub fn record_of(&self, connection_id: ConnectionId) -> Option<&ConnectionRecord> {
        self.pending.get(&connection_id).or_else(|| {
            self.user_of(connection_id)
                .and_then(|user_id| self.authenticated.get(user_id))
        })
    }

    /// Returns the sink of a live connection in either index.
    #[must_use]
    pub fn sink_of(&self, connection_id: ConnectionId) -> Option<Arc<dyn FrameSink>> {
        self.record_of(connection_id).map(ConnectionRecord::sink)
    }

    /// Ids of all authenticated users.
    #[must_use]
    pub fn authenticated_users(&self) -> Vec<UserId> {
        self.authenticated.keys().cloned().collect()
    }

    /// Iterates over every live record, pending ones first.
    pub fn records(&self) -> impl Iterator<Item = &ConnectionRecord> {
        self.pending.values().chain(self.authenticated.values())
    }

    /// Number of pending connections.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of authenticated connections.
    #[must_use]
    pub fn authenticated_len(&self) -> usize {
        self.authenticated.len()
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len() + self.authenticated.len()
    }

    /// Returns `true` if no connection is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
