//! Pending reply handlers keyed by correlation id.
//!
//! [`CallbackTable`] allocates ids from a per-endpoint counter starting at 1
//! and stores one handler per outstanding request. An entry is removed the
//! first time its reply arrives, so long-lived connections do not
//! accumulate resolved handlers.
//!
//! Entries carry an owner: the server tags each entry with the connection
//! it was sent to so that replies from other connections are ignored and
//! entries can be swept when the connection closes. The client uses `()`.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::protocol::CallbackId;

/// Handler invoked with the reply payload.
pub type ReplyHandler = Box<dyn FnOnce(Value) + Send + 'static>;

struct PendingCallback<O> {
    owner: O,
    handler: ReplyHandler,
}

/// Table of outstanding requests.
///
/// Not synchronized; endpoints keep it behind a lock and always invoke
/// handlers after releasing it, see [`CallbackTable::take`].
pub struct CallbackTable<O = ()> {
    next: u64,
    entries: HashMap<CallbackId, PendingCallback<O>>,
}

impl<O> CallbackTable<O> {
    /// Creates an empty table whose first id is 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: 1,
            entries: HashMap::new(),
        }
    }

    /// Stores `handler` under the next counter value and returns that id.
    pub fn allocate(&mut self, owner: O, handler: ReplyHandler) -> CallbackId {
        // Skipping only happens after the counter wraps around.
        let id = loop {
            let candidate = CallbackId::new(self.next);
            self.next = self.next.wrapping_add(1);
            if let Some(id) = candidate
                && !self.entries.contains_key(&id)
            {
                break id;
            }
        };
        self.entries.insert(id, PendingCallback { owner, handler });
        id
    }

    /// Removes and returns the handler for `id`, if any.
    pub fn take(&mut self, id: CallbackId) -> Option<ReplyHandler> {
        self.entries.remove(&id).map(|entry| entry.handler)
    }

    /// Removes the handler for `id` and invokes it with `data`.
    ///
    /// Returns `false` for unknown ids: the reply may have arrived after
    /// its connection was swept, which is not an error.
    pub fn resolve(&mut self, id: CallbackId, data: Value) -> bool {
        match self.take(id) {
            Some(handler) => {
                handler(data);
                true
            }
            None => false,
        }
    }

    /// Drops every outstanding handler, returning how many were pending.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Returns `true` if `id` is outstanding.
    #[must_use]
    pub fn contains(&self, id: CallbackId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of outstanding handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no handler is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<O: PartialEq> CallbackTable<O> {
    /// Like [`CallbackTable::take`], but only if `id` was sent to `owner`.
    pub fn take_owned(&mut self, owner: &O, id: CallbackId) -> Option<ReplyHandler> {
        if self.entries.get(&id).is_some_and(|entry| &entry.owner == owner) {
            self.take(id)
        } else {
            None
        }
    }

    /// Drops all handlers owned by `owner`, returning how many were removed.
    pub fn sweep(&mut self, owner: &O) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| &entry.owner != owner);
        before - self.entries.len()
    }
}

impl<O> Default for CallbackTable<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> fmt::Debug for CallbackTable<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackTable")
            .field("next", &self.next)
            .field("pending", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<Value>>>, ReplyHandler) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, Box::new(move |data| sink.lock().push(data)))
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut table: CallbackTable = CallbackTable::new();
        let first = table.allocate((), Box::new(|_| {}));
        let second = table.allocate((), Box::new(|_| {}));
        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 2);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn resolve_invokes_exactly_once() {
        let mut table: CallbackTable = CallbackTable::new();
        let (seen, handler) = recorder();
        let id = table.allocate((), handler);

        assert!(table.resolve(id, json!("x")));
        assert!(!table.resolve(id, json!("y")));
        assert_eq!(*seen.lock(), vec![json!("x")]);
        assert!(table.is_empty());
    }

    #[test]
    fn unknown_id_is_a_noop() {
        let mut table: CallbackTable = CallbackTable::new();
        let Some(id) = CallbackId::new(99) else {
            panic!("non-zero id");
        };
        assert!(!table.resolve(id, Value::Null));
    }

    #[test]
    fn counter_survives_resolution() {
        let mut table: CallbackTable = CallbackTable::new();
        let id = table.allocate((), Box::new(|_| {}));
        table.resolve(id, Value::Null);
        let next = table.allocate((), Box::new(|_| {}));
        assert_eq!(next.get(), 2);
    }

    #[test]
    fn take_owned_ignores_other_owners() {
        let mut table: CallbackTable<u8> = CallbackTable::new();
        let id = table.allocate(1, Box::new(|_| {}));
        assert!(table.take_owned(&2, id).is_none());
        assert!(table.contains(id));
        assert!(table.take_owned(&1, id).is_some());
        assert!(!table.contains(id));
    }

    #[test]
    fn sweep_drops_only_owned_entries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut table: CallbackTable<u8> = CallbackTable::new();
        for owner in [1, 1, 2] {
            let calls = Arc::clone(&calls);
            table.allocate(
                owner,
                Box::new(move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        assert_eq!(table.sweep(&1), 2);
        assert_eq!(table.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(table.clear(), 1);
    }
}
