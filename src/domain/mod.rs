//! Domain layer: identities, connection registry, callbacks and routing.
//!
//! This module contains the endpoint-independent building blocks: the
//! connection registry state machine with its per-connection outbox, the
//! callback correlation table, the per-type event router with its reply
//! capability, and the lifecycle event bus.

pub mod callback;
pub mod connection_id;
pub mod event_bus;
pub mod events;
pub mod outbox;
pub mod registry;
pub mod reply;
pub mod router;
pub mod user;

pub use callback::{CallbackTable, ReplyHandler};
pub use connection_id::ConnectionId;
pub use event_bus::{EventBus, LifecycleEvent};
pub use events::{ClientEvent, ServerEvent};
pub use outbox::Outbox;
pub use registry::{ConnectionInfo, ConnectionRecord, ConnectionRegistry, ConnectionState};
pub use reply::Reply;
pub use router::{EventRouter, Handler};
pub use user::{User, UserId};
