//! Identity of one accepted transport connection.
//!
//! The server mints a [`ConnectionId`] when a socket is accepted. It keys
//! the pending index of the registry, owns every server-side callback the
//! connection registers, and becomes the user id of connections admitted
//! without authentication. Its text form is the hyphenated UUID, which is
//! what logs print and what [`str::parse`] accepts back.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Random (UUID v4) id of a live connection, fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Mints a fresh id for a newly accepted connection.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::UserId;

    #[test]
    fn minted_ids_differ() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn logged_form_parses_back() {
        let id = ConnectionId::new();
        let logged = id.to_string();
        assert_eq!(logged.len(), 36);

        let Ok(parsed) = format!(" {logged}\n").parse::<ConnectionId>() else {
            panic!("hyphenated id should parse");
        };
        assert_eq!(parsed, id);
        assert!("conn-1".parse::<ConnectionId>().is_err());
    }

    #[test]
    fn auto_authenticated_user_id_is_text_form() {
        let id = ConnectionId::new();
        assert_eq!(UserId::from(id), UserId::Text(id.to_string()));
    }

    #[test]
    fn serializes_as_bare_string() {
        let id = ConnectionId::new();
        let Ok(value) = serde_json::to_value(id) else {
            panic!("id should serialize");
        };
        assert_eq!(value, serde_json::Value::String(id.to_string()));
    }
}
