//! Fault injection for any [`Transport`].
//!
//! Real networks lose, duplicate, corrupt and reorder datagrams.  To exercise
//! the reliability layer without depending on actual network conditions,
//! [`Simulator`] wraps a transport and applies a fault model to everything it
//! sends:
//!
//! | Fault       | Effect                                                   |
//! |-------------|----------------------------------------------------------|
//! | Loss        | The datagram never arrives.                              |
//! | Duplication | The datagram arrives twice.                              |
//! | Corruption  | One byte is flipped; the checksum rejects the datagram. |
//! | Delay       | The datagram is held back and released after the next   |
//! |             | one, so the two arrive swapped.                          |
//!
//! Faults are drawn from a seeded generator, so a failing run can be
//! replayed exactly.  Individual datagrams can also be dropped by index,
//! which is how tests stage a specific lost acknowledgment.  Receives pass
//! straight through; wrap both ends to fault both directions.

use std::collections::HashSet;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::socket::SocketError;
use crate::transport::Transport;

/// Configuration for the fault model.
///
/// Rates are probabilities in `[0.0, 1.0]`; their sum should not exceed one.
#[derive(Debug, Clone, Default)]
pub struct SimulatorConfig {
    pub loss_rate: f64,
    pub duplicate_rate: f64,
    pub corrupt_rate: f64,
    pub delay_rate: f64,
    pub seed: u64,
    /// Zero-based indices of outgoing datagrams that are always dropped.
    pub drop_outgoing: HashSet<usize>,
}

impl SimulatorConfig {
    /// Drop exactly the listed outgoing datagrams and nothing else.
    pub fn dropping(indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            drop_outgoing: indices.into_iter().collect(),
            ..Self::default()
        }
    }
}

/// What happened to one outgoing datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fate {
    Delivered,
    Dropped,
    Duplicated,
    Corrupted,
    Delayed,
}

/// A fault-injecting wrapper around another transport.
pub struct Simulator<T> {
    inner: T,
    config: SimulatorConfig,
    rng: StdRng,
    held: Vec<Vec<u8>>,
    trace: Vec<Fate>,
}

impl<T: Transport> Simulator<T> {
    pub fn new(inner: T, config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            inner,
            config,
            rng,
            held: Vec::new(),
            trace: Vec::new(),
        }
    }

    /// Fate of every datagram sent so far, in send order.
    pub fn trace(&self) -> &[Fate] {
        &self.trace
    }

    fn decide(&mut self, index: usize) -> Fate {
        if self.config.drop_outgoing.contains(&index) {
            return Fate::Dropped;
        }
        let roll: f64 = self.rng.random();
        let mut edge = self.config.loss_rate;
        if roll < edge {
            return Fate::Dropped;
        }
        edge += self.config.duplicate_rate;
        if roll < edge {
            return Fate::Duplicated;
        }
        edge += self.config.corrupt_rate;
        if roll < edge {
            return Fate::Corrupted;
        }
        edge += self.config.delay_rate;
        if roll < edge {
            return Fate::Delayed;
        }
        Fate::Delivered
    }
}

impl<T: Transport> Transport for Simulator<T> {
    async fn send(&mut self, datagram: &[u8]) -> Result<(), SocketError> {
        let index = self.trace.len();
        let fate = self.decide(index);
        log::trace!("[sim] datagram #{index} ({} bytes): {fate:?}", datagram.len());

        match fate {
            Fate::Dropped => {}
            Fate::Delivered => self.inner.send(datagram).await?,
            Fate::Duplicated => {
                self.inner.send(datagram).await?;
                self.inner.send(datagram).await?;
            }
            Fate::Corrupted => {
                let mut bytes = datagram.to_vec();
                if !bytes.is_empty() {
                    let at = self.rng.random_range(0..bytes.len());
                    bytes[at] ^= 0xFF;
                }
                self.inner.send(&bytes).await?;
            }
            Fate::Delayed => self.held.push(datagram.to_vec()),
        }

        if fate != Fate::Delayed {
            for late in std::mem::take(&mut self.held) {
                self.inner.send(&late).await?;
            }
        }
        self.trace.push(fate);
        Ok(())
    }

    async fn recv(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, SocketError> {
        self.inner.recv(wait).await
    }
}
