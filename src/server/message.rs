//! Inbound message as seen by server-side handlers.

use serde_json::Value;

use super::handshake::Handshake;
use crate::domain::{ConnectionId, Reply, User, UserId};

/// One routed inbound message.
///
/// For authenticated connections `payload.user_id` has already been
/// overwritten with the registry's user id, so handlers can trust it.
#[derive(Debug)]
pub struct ServerMessage {
    /// Message type the handler was registered for.
    pub message_type: String,
    /// Payload (`data` on the wire).
    pub payload: Value,
    /// Connection the message arrived on.
    pub connection_id: ConnectionId,
    /// Authenticated identity of the sender, if any.
    pub user_id: Option<UserId>,
    pub(crate) reply: Reply,
    pub(crate) handshake: Option<Handshake>,
}

impl ServerMessage {
    /// Answers the sender's request. Logs and returns `false` if the
    /// sender did not ask for a reply.
    pub fn reply(&self, data: Value) -> bool {
        self.reply.send(data)
    }

    /// Reply capability, for handlers that answer later.
    #[must_use]
    pub fn reply_handle(&self) -> Reply {
        self.reply.clone()
    }

    /// Handshake capability; present only on `authenticate` messages.
    #[must_use]
    pub const fn handshake(&self) -> Option<&Handshake> {
        self.handshake.as_ref()
    }

    /// Shorthand for `handshake().promote(user)`.
    ///
    /// Returns `false` when this is not an `authenticate` message or the
    /// connection is no longer pending.
    pub fn authenticate(&self, user: User) -> bool {
        match &self.handshake {
            Some(handshake) => handshake.promote(user),
            None => {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    message_type = %self.message_type,
                    "authenticate called outside of a handshake"
                );
                false
            }
        }
    }
}
