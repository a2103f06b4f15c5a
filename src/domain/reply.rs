//! Reply capability handed to message handlers.

use std::sync::Arc;

use serde_json::Value;

use super::Outbox;
use crate::protocol::{CallbackId, Codec, Envelope, SubEnvelope};
use crate::transport::FrameSink;

/// Where a reply goes.
#[derive(Debug, Clone)]
enum Route {
    /// Written as its own `callback` frame.
    Direct(Arc<dyn FrameSink>, Codec),
    /// Queued as a typeless bundle item behind earlier writes.
    Queued(Outbox),
}

/// Sends the answer to one inbound request.
///
/// When the inbound message carried no `callback_id` the reply is a stub:
/// calling [`Reply::send`] only logs a warning, because the peer is not
/// waiting for anything.
#[derive(Debug, Clone)]
pub struct Reply {
    callback_id: Option<CallbackId>,
    route: Route,
}

impl Reply {
    /// Creates a reply bound to the connection behind `sink`.
    #[must_use]
    pub fn new(callback_id: Option<CallbackId>, sink: Arc<dyn FrameSink>, codec: Codec) -> Self {
        Self {
            callback_id,
            route: Route::Direct(sink, codec),
        }
    }

    /// Creates a reply that joins the connection's bundle queue.
    #[must_use]
    pub const fn queued(callback_id: Option<CallbackId>, outbox: Outbox) -> Self {
        Self {
            callback_id,
            route: Route::Queued(outbox),
        }
    }

    /// Returns `true` if the peer is waiting for a reply.
    #[must_use]
    pub const fn is_expected(&self) -> bool {
        self.callback_id.is_some()
    }

    /// Correlation id of the request being answered.
    #[must_use]
    pub const fn callback_id(&self) -> Option<CallbackId> {
        self.callback_id
    }

    /// Writes `{type: "callback", data, callback_id}` back to the peer, or
    /// queues `{data, callback_id}` for the next bundle.
    ///
    /// Returns `false` if no reply was expected or the connection is gone.
    pub fn send(&self, data: Value) -> bool {
        let Some(callback_id) = self.callback_id else {
            tracing::warn!("peer did not specify a callback; reply dropped");
            return false;
        };
        match &self.route {
            Route::Direct(sink, codec) => {
                match sink.write(codec.encode(&Envelope::reply(callback_id, data))) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::debug!(%callback_id, error = %e, "reply not delivered");
                        false
                    }
                }
            }
            Route::Queued(outbox) => {
                outbox.push(SubEnvelope::callback(callback_id, data));
                true
            }
        }
    }
}
