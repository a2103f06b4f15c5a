//! Error types for the messaging layer.
//!
//! [`SocketError`] is the central error type. None of these errors is allowed
//! to take the process down: decode failures drop the frame, authentication
//! failures are answered on the wire, and handshake misses are reported as
//! `false` to the application.

use crate::domain::ConnectionId;

/// Errors raised by the codec, the endpoints and the transports.
///
/// # Error Categories
///
/// | Variant                   | Raised by          | Handling                          |
/// |---------------------------|--------------------|-----------------------------------|
/// | `Decode`                  | codec              | logged, frame dropped             |
/// | `MissingType`             | codec              | logged, frame dropped             |
/// | `InvalidCallbackId`       | codec              | logged, frame dropped             |
/// | `InvalidBundle`           | codec              | logged, frame dropped             |
/// | `ReservedType`            | endpoints (send)   | message not sent                  |
/// | `AuthenticationRequired`  | server endpoint    | answered with an auth error frame |
/// | `HandshakeNotFound`       | connection registry| `promote` reports `false`         |
/// | `TransportUnavailable`    | client endpoint    | `failure` event, start aborted    |
/// | `ConnectionClosed`        | frame sinks        | write dropped                     |
/// | `Config`                  | configuration      | surfaced at startup               |
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SocketError {
    /// The frame is not valid JSON or not a JSON object.
    #[error("malformed frame: {0}")]
    Decode(String),

    /// The frame has no string `type` field.
    #[error("no message type specified")]
    MissingType,

    /// The correlation id is present but not a positive integer.
    #[error("callback id must be a positive integer")]
    InvalidCallbackId,

    /// A bundle frame whose data is not an array.
    #[error("bundle data must be an array")]
    InvalidBundle,

    /// An outbound message used the profile's bundle type.
    #[error("message type {0:?} is reserved for bundles")]
    ReservedType(String),

    /// A pending connection sent something other than `authenticate`.
    #[error("not authenticated")]
    AuthenticationRequired,

    /// `promote` was called for a connection that is no longer pending.
    #[error("no pending connection {0}")]
    HandshakeNotFound(ConnectionId),

    /// The client could not build or open its transport.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The underlying transport has already been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SocketError {
    /// Returns `true` for errors that only cost the current frame.
    #[must_use]
    pub const fn is_frame_error(&self) -> bool {
        matches!(
            self,
            Self::Decode(_) | Self::MissingType | Self::InvalidCallbackId | Self::InvalidBundle
        )
    }
}
