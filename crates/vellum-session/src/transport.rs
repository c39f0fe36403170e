//! Message transport abstraction.
//!
//! Sessions only produce and consume encoded envelopes; how the bytes move
//! between peers is out of scope. The in-memory pair here carries the test
//! suites and simulations.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Delivers encoded envelopes to the remote peer.
#[async_trait]
pub trait MessageTransport: Send + Sync + 'static {
    /// Send one encoded envelope. Delivery failures are transient from the
    /// session's point of view; the caller decides whether to retry.
    async fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError>;
}

/// Transport delivery failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub String);

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for TransportError {}

/// In-memory transport: two halves connected by channels.
pub struct MemoryTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MemoryTransport {
    /// Create a connected pair; what one half sends, the other receives.
    pub fn pair() -> (MemoryTransport, MemoryTransport) {
        let (tx_a, rx_b) = mpsc::unbounded_channel();
        let (tx_b, rx_a) = mpsc::unbounded_channel();
        (
            MemoryTransport {
                tx: tx_a,
                rx: Mutex::new(rx_a),
            },
            MemoryTransport {
                tx: tx_b,
                rx: Mutex::new(rx_b),
            },
        )
    }

    /// Receive the next inbound envelope, if one is queued.
    pub fn try_recv(&self) -> Option<Vec<u8>> {
        self.rx.lock().try_recv().ok()
    }

    /// Drain every queued inbound envelope.
    pub fn drain(&self) -> Vec<Vec<u8>> {
        let mut rx = self.rx.lock();
        let mut out = Vec::new();
        while let Ok(bytes) = rx.try_recv() {
            out.push(bytes);
        }
        out
    }
}

#[async_trait]
impl MessageTransport for MemoryTransport {
    async fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.tx
            .send(bytes)
            .map_err(|_| TransportError("peer disconnected".to_string()))
    }
}
