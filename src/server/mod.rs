//! Server side: connection registry, authentication handshake and
//! addressed/broadcast delivery over many transport connections.

pub mod endpoint;
pub mod handshake;
pub mod message;

pub use endpoint::ServerEndpoint;
pub use handshake::Handshake;
pub use message::ServerMessage;
