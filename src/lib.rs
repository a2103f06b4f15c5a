//! # sockwrap
//!
//! Request/response messaging and an authentication handshake over
//! WebSocket text frames.
//!
//! Every frame is a JSON envelope `{type, data, callback_id?}`. A sender
//! that wants an answer registers a callback and puts its id on the
//! envelope; the peer answers with `{type: "callback", data, callback_id}`.
//! Several envelopes can travel in one `bundle` frame. On the server, new
//! connections can be held pending until an `authenticate` handler binds
//! them to a user id; after that, payloads carry a trusted `user_id`.
//!
//! ## Architecture
//!
//! ```text
//! ClientEndpoint ── tokio-tungstenite ──┐      ┌── axum ws (ws/) ── ServerEndpoint
//!     │                                 │      │                       │
//!     ├── CallbackTable                 └─ frames ─┘                   ├── ConnectionRegistry
//!     ├── EventRouter<ClientMessage>                                   ├── CallbackTable<ConnectionId>
//!     └── EventBus<ClientEvent>                                        ├── EventRouter<ServerMessage>
//!                                                                      └── EventBus<ServerEvent>
//!                    Codec (protocol/) on both sides
//! ```

pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod protocol;
pub mod server;
pub mod transport;
pub mod ws;
