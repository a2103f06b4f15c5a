//! JSON text-frame codec.
//!
//! ```text
//! Envelope      := { "type": string, "data": any, "callback_id"?: int }
//! Bundle        := { "type": "bundle", "data": [ SubEnvelope, ... ] }
//! SubEnvelope   := { "type"?: string, "data"?: any, "callback_id"?: int }
//! CallbackReply := { "type": "callback", "data": any, "callback_id": int }
//! ```
//!
//! The compact profile spells the keys `t`/`d`/`c` and the bundle type `b`.
//! A [`Codec`] speaks exactly one profile; frames of the other profile fail
//! to decode with [`SocketError::MissingType`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::envelope::{CallbackId, Envelope, Inbound, SubEnvelope};
use crate::error::SocketError;

/// Key scheme used on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireProfile {
    /// `type` / `data` / `callback_id`, bundle type `bundle`.
    #[default]
    Standard,
    /// `t` / `d` / `c`, bundle type `b`.
    Compact,
}

/// Wire spelling of each envelope field for one profile.
#[derive(Debug, Clone, Copy)]
struct WireKeys {
    message_type: &'static str,
    data: &'static str,
    callback_id: &'static str,
    bundle: &'static str,
}

impl WireProfile {
    const fn keys(self) -> WireKeys {
        match self {
            Self::Standard => WireKeys {
                message_type: "type",
                data: "data",
                callback_id: "callback_id",
                bundle: "bundle",
            },
            Self::Compact => WireKeys {
                message_type: "t",
                data: "d",
                callback_id: "c",
                bundle: "b",
            },
        }
    }

    /// Message type that marks a bundle frame in this profile.
    #[must_use]
    pub const fn bundle_type(self) -> &'static str {
        self.keys().bundle
    }
}

impl fmt::Display for WireProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => f.write_str("standard"),
            Self::Compact => f.write_str("compact"),
        }
    }
}

impl FromStr for WireProfile {
    type Err = SocketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "compact" => Ok(Self::Compact),
            other => Err(SocketError::Config(format!("unknown wire profile: {other}"))),
        }
    }
}

/// Encoder/decoder bound to one [`WireProfile`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Codec {
    profile: WireProfile,
}

impl Codec {
    /// Creates a codec for the given profile.
    #[must_use]
    pub const fn new(profile: WireProfile) -> Self {
        Self { profile }
    }

    /// Returns the profile this codec speaks.
    #[must_use]
    pub const fn profile(&self) -> WireProfile {
        self.profile
    }

    /// Checks that `message_type` can travel as a plain envelope.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::ReservedType`] for the profile's bundle type,
    /// which the peer would decode as a malformed bundle.
    pub fn check_type(&self, message_type: &str) -> Result<(), SocketError> {
        if message_type == self.profile.keys().bundle {
            Err(SocketError::ReservedType(message_type.to_string()))
        } else {
            Ok(())
        }
    }

    /// Decodes one text frame.
    ///
    /// Malformed bundle items are logged and skipped; the remaining items
    /// are still returned in order.
    ///
    /// # Errors
    ///
    /// - [`SocketError::Decode`] if the frame is not a JSON object.
    /// - [`SocketError::MissingType`] if `type` is absent or not a string.
    /// - [`SocketError::InvalidCallbackId`] if the correlation id is not a
    ///   positive integer.
    /// - [`SocketError::InvalidBundle`] if a bundle's data is not an array.
    pub fn decode(&self, frame: &str) -> Result<Inbound, SocketError> {
        let value: Value =
            serde_json::from_str(frame).map_err(|e| SocketError::Decode(e.to_string()))?;
        let Value::Object(mut object) = value else {
            return Err(SocketError::Decode("frame is not a JSON object".to_string()));
        };
        let keys = self.profile.keys();

        let Some(Value::String(message_type)) = object.remove(keys.message_type) else {
            return Err(SocketError::MissingType);
        };
        let payload = object.remove(keys.data);
        let callback_id = parse_callback_id(object.remove(keys.callback_id))?;

        if message_type == keys.bundle {
            let Some(Value::Array(items)) = payload else {
                return Err(SocketError::InvalidBundle);
            };
            let items = items
                .into_iter()
                .enumerate()
                .filter_map(|(index, item)| match self.decode_item(item) {
                    Ok(sub) => Some(sub),
                    Err(e) => {
                        tracing::warn!(index, error = %e, "dropping malformed bundle item");
                        None
                    }
                })
                .collect();
            return Ok(Inbound::Bundle(items));
        }

        Ok(Inbound::Message(Envelope {
            message_type,
            payload: payload.unwrap_or(Value::Null),
            callback_id,
        }))
    }

    fn decode_item(&self, item: Value) -> Result<SubEnvelope, SocketError> {
        let Value::Object(mut object) = item else {
            return Err(SocketError::Decode(
                "bundle item is not a JSON object".to_string(),
            ));
        };
        let keys = self.profile.keys();

        let message_type = match object.remove(keys.message_type) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(_) => return Err(SocketError::MissingType),
        };
        let payload = object
            .remove(keys.data)
            .unwrap_or_else(|| Value::Object(Map::new()));
        let callback_id = parse_callback_id(object.remove(keys.callback_id))?;

        Ok(SubEnvelope {
            message_type,
            payload,
            callback_id,
        })
    }

    /// Encodes a single envelope. Total for every in-memory envelope.
    #[must_use]
    pub fn encode(&self, envelope: &Envelope) -> String {
        let keys = self.profile.keys();
        let mut object = Map::new();
        object.insert(
            keys.message_type.to_string(),
            Value::from(envelope.message_type.as_str()),
        );
        object.insert(keys.data.to_string(), envelope.payload.clone());
        if let Some(id) = envelope.callback_id {
            object.insert(keys.callback_id.to_string(), Value::from(id.get()));
        }
        Value::Object(object).to_string()
    }

    /// Encodes a bundle frame carrying `items` in order.
    #[must_use]
    pub fn encode_bundle(&self, items: &[SubEnvelope]) -> String {
        let keys = self.profile.keys();
        let encoded: Vec<Value> = items.iter().map(|item| self.encode_item(item)).collect();
        let mut object = Map::new();
        object.insert(keys.message_type.to_string(), Value::from(keys.bundle));
        object.insert(keys.data.to_string(), Value::Array(encoded));
        Value::Object(object).to_string()
    }

    fn encode_item(&self, item: &SubEnvelope) -> Value {
        let keys = self.profile.keys();
        let mut object = Map::new();
        if let Some(message_type) = &item.message_type {
            object.insert(
                keys.message_type.to_string(),
                Value::from(message_type.as_str()),
            );
        }
        object.insert(keys.data.to_string(), item.payload.clone());
        if let Some(id) = item.callback_id {
            object.insert(keys.callback_id.to_string(), Value::from(id.get()));
        }
        Value::Object(object)
    }
}

fn parse_callback_id(raw: Option<Value>) -> Result<Option<CallbackId>, SocketError> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(CallbackId::new)
            .map(Some)
            .ok_or(SocketError::InvalidCallbackId),
    }
}
