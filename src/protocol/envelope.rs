//! Protocol message units: envelopes, bundle items and correlation ids.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message type of a correlation reply.
pub const CALLBACK_TYPE: &str = "callback";

/// Message type of the authentication handshake.
pub const AUTHENTICATE_TYPE: &str = "authenticate";

/// Correlation id tying an outbound message to exactly one expected reply.
///
/// Always positive; ids are allocated from 1 upwards by
/// [`crate::domain::CallbackTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(u64);

impl CallbackId {
    /// Creates a correlation id, rejecting zero.
    #[must_use]
    pub const fn new(id: u64) -> Option<Self> {
        if id == 0 { None } else { Some(Self(id)) }
    }

    /// Returns the raw integer.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One top-level protocol message.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Message type discriminator.
    pub message_type: String,
    /// Arbitrary structured payload (`data` on the wire).
    pub payload: Value,
    /// Correlation id when the sender expects a reply.
    pub callback_id: Option<CallbackId>,
}

impl Envelope {
    /// Creates an envelope without a correlation id.
    #[must_use]
    pub fn new(message_type: impl Into<String>, payload: Value) -> Self {
        Self {
            message_type: message_type.into(),
            payload,
            callback_id: None,
        }
    }

    /// Attaches a correlation id.
    #[must_use]
    pub const fn with_callback(mut self, callback_id: CallbackId) -> Self {
        self.callback_id = Some(callback_id);
        self
    }

    /// Builds the reply to the request correlated by `callback_id`.
    #[must_use]
    pub fn reply(callback_id: CallbackId, data: Value) -> Self {
        Self::new(CALLBACK_TYPE, data).with_callback(callback_id)
    }

    /// Returns `true` when this envelope answers an earlier request.
    #[must_use]
    pub fn is_reply(&self) -> bool {
        self.message_type == CALLBACK_TYPE
    }
}

/// One item of a bundle. Both `type` and `callback_id` are optional.
#[derive(Debug, Clone, PartialEq)]
pub struct SubEnvelope {
    /// Message type, if the item should be routed to handlers.
    pub message_type: Option<String>,
    /// Payload; defaults to an empty object when absent on the wire.
    pub payload: Value,
    /// Correlation id, if the item resolves a pending callback.
    pub callback_id: Option<CallbackId>,
}

impl SubEnvelope {
    /// Creates a routed bundle item.
    #[must_use]
    pub fn new(message_type: impl Into<String>, payload: Value) -> Self {
        Self {
            message_type: Some(message_type.into()),
            payload,
            callback_id: None,
        }
    }

    /// Creates an item that only resolves a callback.
    #[must_use]
    pub const fn callback(callback_id: CallbackId, payload: Value) -> Self {
        Self {
            message_type: None,
            payload,
            callback_id: Some(callback_id),
        }
    }

    /// Attaches a correlation id.
    #[must_use]
    pub const fn with_callback(mut self, callback_id: CallbackId) -> Self {
        self.callback_id = Some(callback_id);
        self
    }
}

impl From<Envelope> for SubEnvelope {
    fn from(envelope: Envelope) -> Self {
        Self {
            message_type: Some(envelope.message_type),
            payload: envelope.payload,
            callback_id: envelope.callback_id,
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A single message.
    Message(Envelope),
    /// A bundle, already expanded into its items in wire order.
    Bundle(Vec<SubEnvelope>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_not_a_callback_id() {
        assert!(CallbackId::new(0).is_none());
        assert_eq!(CallbackId::new(5).map(CallbackId::get), Some(5));
    }

    #[test]
    fn reply_envelope_uses_callback_type() {
        let Some(id) = CallbackId::new(3) else {
            return;
        };
        let reply = Envelope::reply(id, serde_json::json!({"ok": true}));
        assert!(reply.is_reply());
        assert_eq!(reply.callback_id, Some(id));
    }

    #[test]
    fn envelope_converts_into_bundle_item() {
        let item = SubEnvelope::from(Envelope::new("news", Value::Null));
        assert_eq!(item.message_type.as_deref(), Some("news"));
        assert!(item.callback_id.is_none());
    }
}
