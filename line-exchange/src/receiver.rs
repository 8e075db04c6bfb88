//! Inbound packet classification and item registry.
//!
//! The [`Receiver`] is responsible for everything that happens *after* a raw
//! datagram is decoded into a [`DataPacket`] and *before* the lines land in
//! their item's sink:
//! - Classifying the sequence number against the last accepted one.
//! - Opening a sink the first time an item name shows up.
//! - Appending and flushing the lines of every newly accepted chunk.
//! - Recognising END.
//!
//! The [`Receiver`] does **not** send ACKs itself; it returns a [`Verdict`]
//! that tells [`crate::connection::Connection`] what to send.

use std::collections::HashMap;

use crate::error::{ExchangeError, Result};
use crate::lines::{LineSink, SinkFactory};
use crate::packet::DataPacket;
use crate::state::{Phase, ReceiverState};

/// How an inbound data packet was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// New chunk applied; acknowledge this sequence number.
    Accepted(i32),
    /// Repeat of the last accepted chunk; acknowledge it again, apply nothing.
    Duplicate(i32),
    /// Older than the last accepted chunk; drop without acknowledging.
    Stale,
    /// END; acknowledge with this sentinel.
    End(i32),
}

/// A fully received item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedItem {
    pub name: String,
    pub lines: Vec<String>,
}

struct Entry<S> {
    name: String,
    sink: S,
    lines_written: usize,
}

/// Item name → open sink, in first-seen order.
struct Registry<S> {
    entries: Vec<Entry<S>>,
    index: HashMap<String, usize>,
}

impl<S: LineSink> Registry<S> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn get_or_create<F>(&mut self, name: &str, factory: &mut F) -> Result<&mut Entry<S>>
    where
        F: SinkFactory<Sink = S>,
    {
        let idx = match self.index.get(name) {
            Some(&idx) => idx,
            None => {
                let sink = factory.create(name).map_err(|source| ExchangeError::Sink {
                    name: name.to_owned(),
                    source,
                })?;
                log::info!("[recv] new item {name}");
                self.entries.push(Entry {
                    name: name.to_owned(),
                    sink,
                    lines_written: 0,
                });
                self.index.insert(name.to_owned(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        Ok(&mut self.entries[idx])
    }

    fn close(self) -> Result<Vec<ReceivedItem>> {
        self.entries
            .into_iter()
            .map(|entry| {
                let name = entry.name;
                match entry.sink.close() {
                    Ok(lines) => Ok(ReceivedItem { name, lines }),
                    Err(source) => Err(ExchangeError::Sink { name, source }),
                }
            })
            .collect()
    }
}

/// Sequenced receive-side state for one phase.
pub struct Receiver<F: SinkFactory> {
    /// Sequence number of the last applied chunk; `-1` before the first.
    ///
    /// Never moves backwards.
    pub last_accepted: i32,

    pub state: ReceiverState,

    phase: Phase,
    factory: F,
    registry: Registry<F::Sink>,
}

impl<F: SinkFactory> Receiver<F> {
    pub fn new(phase: Phase, factory: F) -> Self {
        Self {
            last_accepted: -1,
            state: ReceiverState::Listening,
            phase,
            factory,
            registry: Registry::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Process one data packet.
    ///
    /// Only a packet carrying `last_accepted + 1` touches a sink.  A packet
    /// further ahead cannot come from a stop-and-wait peer and is fatal.
    pub fn on_packet(&mut self, pkt: &DataPacket) -> Result<Verdict> {
        self.state = ReceiverState::Processing;

        if pkt.is_end() {
            self.state = ReceiverState::Acked;
            return Ok(Verdict::End(self.phase.end_sentinel()));
        }

        let s = pkt.sequence;
        let verdict = if s == self.last_accepted {
            Verdict::Duplicate(s)
        } else if s == self.last_accepted + 1 {
            self.apply(pkt)?;
            self.last_accepted = s;
            Verdict::Accepted(s)
        } else if s > self.last_accepted + 1 {
            return Err(ExchangeError::SequenceFromFuture {
                received: s,
                last_accepted: self.last_accepted,
            });
        } else {
            Verdict::Stale
        };

        self.state = match verdict {
            Verdict::Stale => ReceiverState::Listening,
            _ => ReceiverState::Acked,
        };
        Ok(verdict)
    }

    /// Close every sink and return the items in first-seen order.
    pub fn close(self) -> Result<Vec<ReceivedItem>> {
        self.registry.close()
    }

    fn apply(&mut self, pkt: &DataPacket) -> Result<()> {
        let entry = self.registry.get_or_create(&pkt.item, &mut self.factory)?;
        if pkt.start_offset as usize != entry.lines_written {
            log::warn!(
                "[recv] {} chunk {} starts at line {} but {} line(s) are stored",
                pkt.item,
                pkt.sequence,
                pkt.start_offset,
                entry.lines_written
            );
        }
        let sink_err = |source| ExchangeError::Sink {
            name: pkt.item.clone(),
            source,
        };
        for line in &pkt.lines {
            entry.sink.append(line).map_err(sink_err)?;
        }
        entry.sink.flush().map_err(sink_err)?;
        entry.lines_written += pkt.lines.len();
        Ok(())
    }
}
