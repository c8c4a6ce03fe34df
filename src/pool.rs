//! Message pool: the sink that collects inbound traffic from every relay.
//!
//! The manager constructs one pool and hands a [`PoolSink`] clone to each
//! relay's read loop; the application drains the pool to process events,
//! notices and command results from all relays in arrival order.

use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use crate::message::RelayMessage;

/// An inbound message tagged with the relay it arrived from.
#[derive(Debug, Clone)]
pub struct PoolMessage {
    /// Url of the relay that produced the message
    pub relay_url: String,
    /// The parsed relay message
    pub message: RelayMessage,
}

/// Cloneable write end handed to each relay's read loop.
#[derive(Debug, Clone)]
pub struct PoolSink {
    tx: mpsc::UnboundedSender<PoolMessage>,
}

impl PoolSink {
    /// Deliver a message into the pool. Delivery is best-effort: if the pool
    /// has been dropped the message is discarded.
    pub fn deliver(&self, relay_url: impl Into<String>, message: RelayMessage) {
        let msg = PoolMessage {
            relay_url: relay_url.into(),
            message,
        };
        if self.tx.send(msg).is_err() {
            debug!("message pool dropped, discarding inbound message");
        }
    }
}

/// The read end aggregating inbound messages from all relays.
#[derive(Debug)]
pub struct MessagePool {
    tx: mpsc::UnboundedSender<PoolMessage>,
    rx: Mutex<mpsc::UnboundedReceiver<PoolMessage>>,
}

impl MessagePool {
    /// Create an empty pool.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// A new sink writing into this pool.
    pub fn sink(&self) -> PoolSink {
        PoolSink {
            tx: self.tx.clone(),
        }
    }

    /// Wait for the next inbound message.
    ///
    /// The pool keeps its own sender alive for [`sink`](Self::sink) clones,
    /// so the channel never closes and this future only resolves with a
    /// message.
    pub async fn recv(&self) -> PoolMessage {
        let mut rx = self.rx.lock().await;
        rx.recv().await.expect("pool keeps a live sender")
    }

    /// Take the next inbound message if one is already queued.
    pub async fn try_recv(&self) -> Option<PoolMessage> {
        self.rx.lock().await.try_recv().ok()
    }
}

impl Default for MessagePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_delivery_order() {
        let pool = MessagePool::new();
        let sink = pool.sink();

        sink.deliver(
            "wss://relay1.com",
            RelayMessage::Notice {
                message: "first".to_string(),
            },
        );
        sink.deliver(
            "wss://relay2.com",
            RelayMessage::Eose {
                subscription_id: "sub1".to_string(),
            },
        );

        let first = pool.recv().await;
        assert_eq!(first.relay_url, "wss://relay1.com");
        assert!(matches!(first.message, RelayMessage::Notice { .. }));

        let second = pool.recv().await;
        assert_eq!(second.relay_url, "wss://relay2.com");
        assert!(matches!(second.message, RelayMessage::Eose { .. }));
    }

    #[tokio::test]
    async fn test_pool_try_recv_empty() {
        let pool = MessagePool::new();
        assert!(pool.try_recv().await.is_none());
    }

    #[tokio::test]
    async fn test_multiple_sinks_share_pool() {
        let pool = MessagePool::new();
        let a = pool.sink();
        let b = pool.sink();

        a.deliver(
            "wss://a",
            RelayMessage::Notice {
                message: "a".to_string(),
            },
        );
        b.deliver(
            "wss://b",
            RelayMessage::Notice {
                message: "b".to_string(),
            },
        );

        assert!(pool.try_recv().await.is_some());
        assert!(pool.try_recv().await.is_some());
        assert!(pool.try_recv().await.is_none());
    }
}
