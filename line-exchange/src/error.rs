//! Session-level error type.
//!
//! Transport timeouts, stale acknowledgments and duplicate packets are part
//! of normal operation and never surface here.  Everything in
//! [`ExchangeError`] ends the session; the caller decides what to do with
//! the process.

use thiserror::Error;

use crate::packet::PacketError;
use crate::socket::SocketError;

pub type Result<T, E = ExchangeError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Socket(#[from] SocketError),

    /// Outbound packet could not be encoded.
    #[error("cannot encode packet: {0}")]
    Packet(#[from] PacketError),

    /// The peer acknowledged a packet that was never sent.
    #[error("protocol violation: ack {acked} is ahead of pending packet {pending}")]
    AckFromFuture { acked: i32, pending: i32 },

    /// The peer sent a packet skipping past the next expected sequence number.
    #[error(
        "protocol violation: packet {received} arrived while {last_accepted} was the last accepted"
    )]
    SequenceFromFuture { received: i32, last_accepted: i32 },

    #[error("item {name} cannot be opened: {source}")]
    MissingItem {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Two items would travel under the same name.
    #[error("item name {name} is used by more than one item")]
    DuplicateItem { name: String },

    #[error("item {name} cannot be read: {source}")]
    SourceRead {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("item {name} cannot be written: {source}")]
    Sink {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Item name or one of its lines does not fit the wire format.
    #[error("item {name} line {line}: {source}")]
    Unsendable {
        name: String,
        line: usize,
        #[source]
        source: PacketError,
    },

    #[error("packet {sequence} unacknowledged after {attempts} retransmissions")]
    RetriesExhausted { sequence: i32, attempts: u32 },
}

impl ExchangeError {
    /// `true` for errors caused by a peer breaking the one-packet-in-flight rule.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            ExchangeError::AckFromFuture { .. } | ExchangeError::SequenceFromFuture { .. }
        )
    }
}
