//! Application identities bound to authenticated connections.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ConnectionId;

/// Identity key of an authenticated session.
///
/// Applications use either numeric database ids or string ids; both keep
/// their JSON shape so the id injected into inbound payloads round-trips
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    /// Numeric id (e.g. a database primary key).
    Number(i64),
    /// String id (e.g. a UUID or a connection id on the auto-auth path).
    Text(String),
}

impl UserId {
    /// Returns the id as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Number(n) => Value::from(*n),
            Self::Text(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self::Number(id)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self::Text(id)
    }
}

impl From<ConnectionId> for UserId {
    fn from(id: ConnectionId) -> Self {
        Self::Text(id.to_string())
    }
}

/// Application-supplied identity.
///
/// Only `id` is interpreted by this crate; every other field is carried
/// through untouched to `authenticated` listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique identity key.
    pub id: UserId,
    /// Additional application fields.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl User {
    /// Creates a user with no extra attributes.
    #[must_use]
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            attributes: Map::new(),
        }
    }

    /// Adds an application attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}
