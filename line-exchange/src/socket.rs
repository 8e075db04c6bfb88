//! UDP socket transport.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` bound to a
//! single peer.  All protocol logic lives elsewhere; this module owns only
//! byte I/O and peer bookkeeping.
//!
//! - A client resolves the listener's address once with [`Socket::connect`]
//!   and addresses it as a fixed peer from then on.
//! - A listener created with [`Socket::bind`] has no peer until the first
//!   datagram arrives; it adopts that sender and drops datagrams from any
//!   other address (one conversation at a time).

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::{timeout, Instant};

use crate::transport::Transport;

/// Largest datagram the protocol ever produces, with headroom.
const MAX_DATAGRAM: usize = 2048;

/// Errors that can arise from socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A send was attempted before any peer is known.
    #[error("no peer address known yet")]
    NoPeer,
    /// The peer's host name did not resolve to any address.
    #[error("could not resolve {0}")]
    Resolve(String),
}

/// A packet-agnostic UDP endpoint talking to one peer.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
    peer: Option<SocketAddr>,
}

impl Socket {
    /// Bind a listening socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self {
            local_addr,
            inner,
            peer: None,
        })
    }

    /// Resolve `target` (`host:port`, host may be a name or a literal) and
    /// bind an ephemeral local socket addressing it.
    pub async fn connect(target: &str) -> Result<Self, SocketError> {
        let peer = lookup_host(target)
            .await
            .map_err(|e| SocketError::Resolve(format!("{target}: {e}")))?
            .next()
            .ok_or_else(|| SocketError::Resolve(target.to_string()))?;
        let local: SocketAddr = if peer.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = Self::bind(local).await?;
        log::debug!("[udp] {} → peer {peer}", socket.local_addr);
        Ok(socket.with_peer(peer))
    }

    /// Fix the peer address explicitly.
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// The peer this socket talks to, once known.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }
}

impl Transport for Socket {
    async fn send(&mut self, datagram: &[u8]) -> Result<(), SocketError> {
        let peer = self.peer.ok_or(SocketError::NoPeer)?;
        self.inner.send_to(datagram, peer).await?;
        Ok(())
    }

    async fn recv(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, SocketError> {
        let deadline = Instant::now() + wait;
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let (n, addr) = match timeout(remaining, self.inner.recv_from(&mut buf)).await {
                Err(_elapsed) => return Ok(None),
                Ok(Ok(received)) => received,
                Ok(Err(e)) if is_transient_io_error(&e) => {
                    log::debug!("[udp] transient receive error: {e}");
                    continue;
                }
                Ok(Err(e)) => return Err(e.into()),
            };
            match self.peer {
                None => {
                    log::info!("[udp] conversation with {addr}");
                    self.peer = Some(addr);
                }
                Some(peer) if peer != addr => {
                    log::warn!("[udp] dropping datagram from stranger {addr}");
                    continue;
                }
                Some(_) => {}
            }
            return Ok(Some(buf[..n].to_vec()));
        }
    }
}

/// Errors that only mean "nothing useful arrived"; the caller keeps waiting.
fn is_transient_io_error(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::WouldBlock
            | ErrorKind::Interrupted
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn loopback() -> Socket {
        Socket::bind("127.0.0.1:0".parse().unwrap())
            .await
            .expect("bind loopback")
    }

    #[tokio::test]
    async fn listener_adopts_first_sender() {
        let mut server = loopback().await;
        let mut client = loopback().await.with_peer(server.local_addr);
        assert!(server.peer().is_none());

        client.send(b"hello").await.unwrap();
        let got = server.recv(Duration::from_secs(2)).await.unwrap();
        assert_eq!(got, Some(b"hello".to_vec()));
        assert_eq!(server.peer(), Some(client.local_addr));

        server.send(b"back").await.unwrap();
        let got = client.recv(Duration::from_secs(2)).await.unwrap();
        assert_eq!(got, Some(b"back".to_vec()));
    }

    #[tokio::test]
    async fn strangers_are_ignored() {
        let mut server = loopback().await;
        let mut first = loopback().await.with_peer(server.local_addr);
        let mut stranger = loopback().await.with_peer(server.local_addr);

        first.send(b"one").await.unwrap();
        server.recv(Duration::from_secs(2)).await.unwrap();

        stranger.send(b"intruder").await.unwrap();
        let got = server.recv(Duration::from_millis(200)).await.unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn send_without_peer_fails() {
        let mut server = loopback().await;
        assert!(matches!(server.send(b"x").await, Err(SocketError::NoPeer)));
    }

    #[tokio::test]
    async fn connect_resolves_literal_address() {
        let server = loopback().await;
        let target = format!("127.0.0.1:{}", server.local_addr.port());
        let client = Socket::connect(&target).await.expect("connect");
        assert_eq!(client.peer(), Some(server.local_addr));
    }
}
