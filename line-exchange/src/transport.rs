//! Datagram transport abstraction.
//!
//! The reliability layer only needs two primitives from the network: send
//! one datagram to the peer, and wait a bounded time for the next datagram
//! from the peer.  [`Transport`] captures exactly that.  Implementations:
//!
//! - [`crate::socket::Socket`] — real UDP.
//! - [`MemoryTransport`] — an in-process pair of channels, for tests.
//! - [`crate::simulator::Simulator`] — fault injection around any of the above.
//!
//! Like UDP, a transport gives no delivery or ordering guarantee that the
//! protocol may rely on.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::socket::SocketError;

/// A connectionless, unreliable datagram channel to one fixed peer.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Send one datagram to the peer.
    async fn send(&mut self, datagram: &[u8]) -> Result<(), SocketError>;

    /// Wait at most `wait` for the next datagram from the peer.
    ///
    /// Returns `Ok(None)` when the wait elapses without data.
    async fn recv(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, SocketError>;
}

/// One end of an in-process datagram link.
///
/// Sends to a peer that has gone away are silently discarded and receives
/// from it simply time out, which is what a UDP endpoint would observe.
#[derive(Debug)]
pub struct MemoryTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MemoryTransport {
    /// Create two connected endpoints.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            Self { tx: a_tx, rx: a_rx },
            Self { tx: b_tx, rx: b_rx },
        )
    }
}

impl Transport for MemoryTransport {
    async fn send(&mut self, datagram: &[u8]) -> Result<(), SocketError> {
        if self.tx.send(datagram.to_vec()).is_err() {
            log::trace!("[mem] peer gone; datagram discarded");
        }
        Ok(())
    }

    async fn recv(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, SocketError> {
        match timeout(wait, self.rx.recv()).await {
            Ok(Some(datagram)) => Ok(Some(datagram)),
            Ok(None) => {
                // Peer dropped its end: behave like a silent peer.
                tokio::time::sleep(wait).await;
                Ok(None)
            }
            Err(_elapsed) => Ok(None),
        }
    }
}
