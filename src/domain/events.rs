//! Lifecycle events published by the endpoints.
//!
//! Message types are routed through [`super::EventRouter`]; these events
//! cover what happens to the connection itself and are delivered through
//! [`super::EventBus`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::{ConnectionId, User, UserId};

/// Server-side connection lifecycle.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The transport accepted a connection.
    Connected {
        /// Transport-assigned id.
        connection_id: ConnectionId,
    },

    /// A pending connection completed the handshake.
    Authenticated {
        /// Promoted connection.
        connection_id: ConnectionId,
        /// Identity supplied by the application.
        user: User,
        /// Promotion time.
        timestamp: DateTime<Utc>,
    },

    /// A connection closed (or was displaced by a newer login).
    Closed {
        /// Closed connection.
        connection_id: ConnectionId,
        /// Identity it was bound to, if authenticated.
        user_id: Option<UserId>,
    },
}

impl ServerEvent {
    /// Returns the connection the event is about.
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        match self {
            Self::Connected { connection_id }
            | Self::Authenticated { connection_id, .. }
            | Self::Closed { connection_id, .. } => *connection_id,
        }
    }

    /// Returns the event name as a static string.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connect",
            Self::Authenticated { .. } => "authenticated",
            Self::Closed { .. } => "close",
        }
    }
}

/// Client-side connection lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// The transport is open.
    Connected,
    /// The transport closed.
    Closed,
    /// The server answered `authenticate`; carries its result payload.
    Authenticated(Value),
    /// The transport could not be started.
    Failure(String),
}

impl ClientEvent {
    /// Returns the event name as a static string.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::Connected => "connect",
            Self::Closed => "close",
            Self::Authenticated(_) => "authenticated",
            Self::Failure(_) => "failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn server_event_serializes_with_tag() {
        let id = ConnectionId::new();
        let event = ServerEvent::Closed {
            connection_id: id,
            user_id: Some(UserId::from(3_i64)),
        };
        assert_eq!(event.event_type_str(), "close");
        assert_eq!(
            serde_json::to_value(&event).ok(),
            Some(json!({"event_type": "closed", "connection_id": id, "user_id": 3}))
        );
    }

    #[test]
    fn client_event_names() {
        assert_eq!(ClientEvent::Connected.event_type_str(), "connect");
        assert_eq!(
            ClientEvent::Authenticated(json!({"result": true})).event_type_str(),
            "authenticated"
        );
        assert_eq!(
            ClientEvent::Failure("no port".to_string()).event_type_str(),
            "failure"
        );
    }
}
