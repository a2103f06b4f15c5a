//! Inbound message as seen by client-side handlers.

use serde_json::Value;

use crate::domain::Reply;

/// One routed inbound message.
#[derive(Debug)]
pub struct ClientMessage {
    /// Message type the handler was registered for.
    pub message_type: String,
    /// Payload (`data` on the wire).
    pub payload: Value,
    pub(crate) reply: Reply,
}

impl ClientMessage {
    /// Answers a server-initiated request. Logs and returns `false` if the
    /// server did not ask for a reply.
    pub fn reply(&self, data: Value) -> bool {
        self.reply.send(data)
    }

    /// Reply capability, for handlers that answer later.
    #[must_use]
    pub fn reply_handle(&self) -> Reply {
        self.reply.clone()
    }
}
