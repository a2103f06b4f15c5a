//! Per-type fan-out of decoded messages to application handlers.
//!
//! Every handler registered for a type is invoked, in registration order.
//! A panicking handler is logged and skipped; the remaining handlers (and
//! the remaining items of a bundle) still run.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Shared handler for messages of one type.
pub type Handler<M> = Arc<dyn Fn(&M) + Send + Sync + 'static>;

/// `type -> ordered handler list` dispatch table.
pub struct EventRouter<M> {
    handlers: HashMap<String, Vec<Handler<M>>>,
}

impl<M> EventRouter<M> {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Appends a handler for `message_type`.
    pub fn on<F>(&mut self, message_type: impl Into<String>, handler: F)
    where
        F: Fn(&M) + Send + Sync + 'static,
    {
        self.handlers
            .entry(message_type.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Removes every handler for `message_type`, returning how many there were.
    pub fn off(&mut self, message_type: &str) -> usize {
        self.handlers.remove(message_type).map_or(0, |list| list.len())
    }

    /// Snapshot of the handlers for `message_type`.
    ///
    /// Endpoints take the snapshot under their lock and invoke it after
    /// releasing the lock, so handlers may register more handlers or send.
    #[must_use]
    pub fn handlers(&self, message_type: &str) -> Vec<Handler<M>> {
        self.handlers
            .get(message_type)
            .map(|list| list.iter().map(Arc::clone).collect())
            .unwrap_or_default()
    }

    /// Returns `true` if at least one handler is registered for the type.
    #[must_use]
    pub fn has_handlers(&self, message_type: &str) -> bool {
        self.handlers
            .get(message_type)
            .is_some_and(|list| !list.is_empty())
    }

    /// Invokes every handler for `message_type` with `message`.
    ///
    /// Returns the number of handlers that completed without panicking.
    pub fn dispatch(&self, message_type: &str, message: &M) -> usize {
        invoke_all(&self.handlers(message_type), message_type, message)
    }
}

impl<M> Default for EventRouter<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for EventRouter<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&str, usize> = self
            .handlers
            .iter()
            .map(|(k, v)| (k.as_str(), v.len()))
            .collect();
        f.debug_struct("EventRouter")
            .field("handlers", &counts)
            .finish()
    }
}

/// Invokes `handlers` in order, isolating panics.
pub fn invoke_all<M>(handlers: &[Handler<M>], message_type: &str, message: &M) -> usize {
    if handlers.is_empty() {
        tracing::debug!(message_type, "no handler registered");
    }
    handlers
        .iter()
        .filter(|handler| isolate(message_type, || handler(message)))
        .count()
}

/// Runs `f`, logging instead of unwinding if it panics.
///
/// Returns `true` if `f` completed normally.
pub fn isolate(label: &str, f: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(_) => {
            tracing::error!(label, "handler panicked");
            false
        }
    }
}
