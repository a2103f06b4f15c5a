//! Transport write/close capability.
//!
//! Endpoints never talk to a socket directly. Each live connection is
//! represented by a [`FrameSink`]: something that accepts encoded text
//! frames and can be told to close. The WebSocket adapters in
//! [`crate::ws`] back it with a [`ChannelSink`] drained by the socket task;
//! [`MemorySink`] records frames for tests and embedding.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::SocketError;

/// Write/close capability of one transport connection.
pub trait FrameSink: Send + Sync + fmt::Debug {
    /// Queues one text frame for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::ConnectionClosed`] if the connection is gone.
    fn write(&self, frame: String) -> Result<(), SocketError>;

    /// Forces the connection closed. Idempotent.
    fn close(&self);
}

/// Instruction for the task that owns the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send one text frame.
    Frame(String),
    /// Close the socket.
    Close,
}

/// [`FrameSink`] that forwards to an unbounded channel.
///
/// Writes never block the dispatching task; the socket task drains the
/// receiver in order, which preserves per-connection FIFO delivery.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelSink {
    /// Creates a sink and the receiver the socket task must drain.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl FrameSink for ChannelSink {
    fn write(&self, frame: String) -> Result<(), SocketError> {
        self.tx
            .send(Outbound::Frame(frame))
            .map_err(|_| SocketError::ConnectionClosed)
    }

    fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

/// [`FrameSink`] that keeps every frame in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    frames: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MemorySink {
    /// Creates an open, empty sink.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the frames written so far.
    #[must_use]
    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().clone()
    }

    /// Returns and forgets the frames written so far.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.frames.lock())
    }

    /// Returns `true` once [`FrameSink::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl FrameSink for MemorySink {
    fn write(&self, frame: String) -> Result<(), SocketError> {
        if self.is_closed() {
            return Err(SocketError::ConnectionClosed);
        }
        self.frames.lock().push(frame);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_preserves_order() {
        let (sink, mut rx) = ChannelSink::channel();
        assert!(sink.write("a".to_string()).is_ok());
        assert!(sink.write("b".to_string()).is_ok());
        sink.close();

        assert_eq!(rx.recv().await, Some(Outbound::Frame("a".to_string())));
        assert_eq!(rx.recv().await, Some(Outbound::Frame("b".to_string())));
        assert_eq!(rx.recv().await, Some(Outbound::Close));
    }

    #[test]
    fn channel_sink_reports_dropped_receiver() {
        let (sink, rx) = ChannelSink::channel();
        drop(rx);
        assert_eq!(
            sink.write("lost".to_string()),
            Err(SocketError::ConnectionClosed)
        );
    }

    #[test]
    fn memory_sink_rejects_writes_after_close() {
        let sink = MemorySink::new();
        assert!(sink.write("one".to_string()).is_ok());
        sink.close();
        assert!(sink.is_closed());
        assert!(sink.write("two".to_string()).is_err());
        assert_eq!(sink.drain(), vec!["one".to_string()]);
        assert!(sink.frames().is_empty());
    }
}
