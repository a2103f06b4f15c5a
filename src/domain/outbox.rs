//! Per-connection queue of bundle items.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::protocol::SubEnvelope;

/// Items waiting for the next bundle flush of one connection.
///
/// Cloning yields another handle to the same queue, so replies can be
/// queued without going through the registry. With bundling enabled every
/// server write to the connection goes through here, which keeps the wire
/// order equal to the call order.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    items: Arc<Mutex<Vec<SubEnvelope>>>,
}

impl Outbox {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one item.
    pub fn push(&self, item: SubEnvelope) {
        self.items.lock().push(item);
    }

    /// Appends `items` in order.
    pub fn extend(&self, items: impl IntoIterator<Item = SubEnvelope>) {
        self.items.lock().extend(items);
    }

    /// Takes every queued item.
    pub fn take(&self) -> Vec<SubEnvelope> {
        std::mem::take(&mut *self.items.lock())
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn clones_share_one_queue() {
        let outbox = Outbox::new();
        let handle = outbox.clone();
        outbox.push(SubEnvelope::new("a", json!(1)));
        handle.extend([SubEnvelope::new("b", json!(2)), SubEnvelope::new("c", json!(3))]);

        assert_eq!(outbox.len(), 3);
        let types: Vec<_> = handle
            .take()
            .into_iter()
            .filter_map(|item| item.message_type)
            .collect();
        assert_eq!(types, ["a", "b", "c"]);
        assert!(outbox.is_empty());
    }
}
