//! Capability that promotes a pending connection.

use super::endpoint::ServerEndpoint;
use crate::domain::{ConnectionId, User};

/// Handed to `authenticate` handlers, closed over the connection that
/// sent the request.
///
/// The application validates credentials however it likes (possibly
/// later, from another task) and calls [`Handshake::promote`] with the
/// resulting identity.
#[derive(Debug, Clone)]
pub struct Handshake {
    connection_id: ConnectionId,
    endpoint: ServerEndpoint,
}

impl Handshake {
    pub(crate) const fn new(connection_id: ConnectionId, endpoint: ServerEndpoint) -> Self {
        Self {
            connection_id,
            endpoint,
        }
    }

    /// Connection being authenticated.
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Binds `user` to the connection.
    ///
    /// Returns `false` if the connection is no longer pending (it closed
    /// mid-handshake or already authenticated).
    pub fn promote(&self, user: User) -> bool {
        self.endpoint.authenticate(self.connection_id, user)
    }
}
