//! `line-exchange` — reliable exchange of line-oriented files over UDP.
//!
//! A client uploads a set of named text files to a server; the server
//! merges them into one artifact and sends it back.  Both directions use
//! the same stop-and-wait reliability layer: one packet in flight, an
//! acknowledgment per packet, retransmission on timeout and an END
//! handshake that closes each phase.
//!
//! # Architecture
//!
//! ```text
//!  ┌───────────┐  chunks  ┌──────────┐   packets   ┌──────────┐
//!  │ Scheduler │─────────▶│  Sender  │────────────▶│ Receiver │──▶ sinks
//!  └───────────┘          └────┬─────┘             └────┬─────┘
//!                              │         ACKs           │
//!                              │◀───────────────────────┘
//!  ┌───────────────────────────▼────────────────────────────┐
//!  │                      Connection                        │
//!  │        (phase loops, deadlines, retransmission)        │
//!  └───────────────────────────┬────────────────────────────┘
//!                              │ datagrams
//!  ┌───────────────────────────▼────────────────────────────┐
//!  │ Transport: Socket (UDP) | MemoryTransport | Simulator  │
//!  └────────────────────────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]      — wire format (serialise / deserialise)
//! - [`transport`]   — datagram transport trait and in-memory pair
//! - [`socket`]      — async UDP transport
//! - [`simulator`]   — lossy / duplicating / reordering transport wrapper
//! - [`sender`]      — stop-and-wait outbound state
//! - [`receiver`]    — sequenced inbound state and item registry
//! - [`scheduler`]   — random interleaving of items into chunks
//! - [`connection`]  — send and receive loops for one phase
//! - [`reassembler`] — merge of received items into the artifact
//! - [`session`]     — client and server roles end to end
//! - [`lines`]       — line sources and sinks (files, memory)
//! - [`state`]       — finite-state-machine types
//! - [`timer`]       — retransmission deadlines and retry cap
//! - [`config`]      — protocol tunables
//! - [`error`]       — session error type

pub mod config;
pub mod connection;
pub mod error;
pub mod lines;
pub mod packet;
pub mod reassembler;
pub mod receiver;
pub mod scheduler;
pub mod sender;
pub mod session;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;
pub mod transport;

pub use config::ExchangeConfig;
pub use connection::{Connection, SendReport};
pub use error::{ExchangeError, Result};
pub use session::{run_client, run_server, ClientReport, ServerOptions, ServerReport};
