//! Fan-out of connection lifecycle events.
//!
//! Message types go through [`super::EventRouter`], which keeps one handler
//! per type. Lifecycle events (connect, authenticate, close) are different:
//! any number of application tasks may watch them, and none of them can
//! answer. [`EventBus`] carries them over a [`tokio::sync::broadcast`]
//! channel so the endpoint never waits on a slow listener.

use tokio::sync::broadcast;

use super::{ClientEvent, ServerEvent};

/// An event an endpoint announces about its own connections.
pub trait LifecycleEvent: Clone + Send + 'static {
    /// Name listeners and logs know the event by.
    fn name(&self) -> &'static str;
}

impl LifecycleEvent for ServerEvent {
    fn name(&self) -> &'static str {
        self.event_type_str()
    }
}

impl LifecycleEvent for ClientEvent {
    fn name(&self) -> &'static str {
        self.event_type_str()
    }
}

/// Lifecycle broadcast owned by one endpoint.
///
/// Listeners that fall more than `capacity` events behind lose the oldest
/// ones and see [`broadcast::error::RecvError::Lagged`].
#[derive(Debug, Clone)]
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E: LifecycleEvent> EventBus<E> {
    /// Creates a bus buffering up to `capacity` events per listener
    /// (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Announces `event` to every current listener and returns how many
    /// saw it. Nobody listening is not an error.
    pub fn emit(&self, event: E) -> usize {
        let name = event.name();
        let listeners = self.sender.send(event).unwrap_or(0);
        tracing::trace!(event = name, listeners, "lifecycle event");
        listeners
    }

    /// Starts listening; only events emitted after this call are seen.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::ConnectionId;

    #[test]
    fn emit_without_listeners_reaches_nobody() {
        let bus = EventBus::new(8);
        assert_eq!(bus.emit(ClientEvent::Connected), 0);
    }

    #[tokio::test]
    async fn late_listener_misses_earlier_events() {
        let bus = EventBus::new(8);
        bus.emit(ClientEvent::Connected);
        let mut rx = bus.subscribe();
        bus.emit(ClientEvent::Authenticated(json!({"ok": true})));

        assert_eq!(
            rx.recv().await.ok(),
            Some(ClientEvent::Authenticated(json!({"ok": true})))
        );
    }

    #[tokio::test]
    async fn every_listener_sees_a_close() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let id = ConnectionId::new();
        let seen = bus.emit(ServerEvent::Closed {
            connection_id: id,
            user_id: None,
        });
        assert_eq!(seen, 2);

        for rx in [&mut first, &mut second] {
            let Ok(event) = rx.recv().await else {
                panic!("listener should receive the close");
            };
            assert_eq!(event.name(), "close");
            assert_eq!(event.connection_id(), id);
        }
    }

    #[tokio::test]
    async fn zero_capacity_still_buffers_one_event() {
        let bus = EventBus::new(0);
        let mut rx = bus.subscribe();
        bus.emit(ClientEvent::Connected);
        bus.emit(ClientEvent::Closed);

        let Err(broadcast::error::RecvError::Lagged(missed)) = rx.recv().await else {
            panic!("slow listener should lag");
        };
        assert_eq!(missed, 1);
        assert_eq!(rx.recv().await.ok(), Some(ClientEvent::Closed));
    }
}
