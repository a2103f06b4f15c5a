//! Client side: one endpoint talking to one server, with its own
//! callback table and authentication flag.

pub mod endpoint;
pub mod message;

pub use endpoint::ClientEndpoint;
pub use message::ClientMessage;
