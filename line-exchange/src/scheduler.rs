//! Multi-item chunk scheduling.
//!
//! The sender never streams one item after another.  For every new packet
//! the [`Scheduler`] picks one of the items that still has unsent lines,
//! uniformly at random, and takes the next 1–3 of its lines.  Items are
//! therefore interleaved on the wire; putting them back in order is the
//! receiver's job.
//!
//! Progress is only credited in [`Scheduler::commit`], which the sender
//! calls once the chunk's acknowledgment arrives.  Until then the chunk is
//! simply retransmitted as it is.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{ExchangeError, Result};
use crate::lines::LineSource;
use crate::packet::{check_item_name, check_line, PacketError, MAX_LINES};

/// Source of the scheduler's choices.
pub trait Pick {
    /// Choose one entry of `candidates` (never empty).
    fn pick_item(&mut self, candidates: &[usize]) -> usize;

    /// Requested chunk length in `1..=MAX_LINES`.
    fn chunk_len(&mut self) -> usize;
}

/// Uniform random choices.
#[derive(Debug, Clone)]
pub struct RandomPick<R> {
    rng: R,
}

impl<R: Rng> RandomPick<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RandomPick<StdRng> {
    /// Reproducible choices.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Choices seeded from the thread-local generator.
    pub fn from_entropy() -> Self {
        Self::seeded(rand::rng().random())
    }
}

impl<R: Rng> Pick for RandomPick<R> {
    fn pick_item(&mut self, candidates: &[usize]) -> usize {
        candidates[self.rng.random_range(0..candidates.len())]
    }

    fn chunk_len(&mut self) -> usize {
        self.rng.random_range(1..=MAX_LINES)
    }
}

/// Predetermined choices, for reproducing exact packet sequences.
///
/// Item choices are item indices; a scripted item that is already complete,
/// or an exhausted script, falls back to the first candidate.  Exhausted
/// chunk lengths fall back to [`MAX_LINES`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedPick {
    items: std::collections::VecDeque<usize>,
    lens: std::collections::VecDeque<usize>,
}

impl ScriptedPick {
    pub fn new(items: impl IntoIterator<Item = usize>, lens: impl IntoIterator<Item = usize>) -> Self {
        Self {
            items: items.into_iter().collect(),
            lens: lens.into_iter().collect(),
        }
    }
}

impl Pick for ScriptedPick {
    fn pick_item(&mut self, candidates: &[usize]) -> usize {
        match self.items.pop_front() {
            Some(item) if candidates.contains(&item) => item,
            _ => candidates[0],
        }
    }

    fn chunk_len(&mut self) -> usize {
        self.lens
            .pop_front()
            .unwrap_or(MAX_LINES)
            .clamp(1, MAX_LINES)
    }
}

/// Sending progress of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemProgress {
    pub name: String,
    pub total_lines: usize,
    pub lines_sent: usize,
    pub completed: bool,
}

impl ItemProgress {
    pub fn remaining(&self) -> usize {
        self.total_lines - self.lines_sent
    }
}

/// Lines of one item selected for the next packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Index of the item in the scheduler.
    pub item: usize,
    pub name: String,
    /// Line index of `lines[0]` within the item.
    pub start: usize,
    pub lines: Vec<String>,
}

/// Chooses chunks across a closed set of items.
#[derive(Debug)]
pub struct Scheduler<S> {
    sources: Vec<S>,
    progress: Vec<ItemProgress>,
    in_flight: bool,
}

impl<S: LineSource> Scheduler<S> {
    /// Pre-scan every source: count its lines and check that the name and
    /// every line fit the wire.  Names must be unique, since the receiver
    /// keys items by name.  Fails before anything is sent.
    pub fn new(sources: Vec<S>) -> Result<Self> {
        let mut progress: Vec<ItemProgress> = Vec::with_capacity(sources.len());
        let mut sources = sources;
        for source in sources.iter_mut() {
            if progress.iter().any(|p| p.name == source.name()) {
                return Err(ExchangeError::DuplicateItem {
                    name: source.name().to_owned(),
                });
            }
            let total_lines = prescan(source)?;
            log::debug!("[sched] {} has {total_lines} line(s)", source.name());
            progress.push(ItemProgress {
                name: source.name().to_owned(),
                total_lines,
                lines_sent: 0,
                // Empty items have nothing to send and never get picked.
                completed: total_lines == 0,
            });
        }
        Ok(Self {
            sources,
            progress,
            in_flight: false,
        })
    }

    /// Read the next chunk, or `None` when every item is complete.
    ///
    /// Must be followed by [`commit`](Self::commit) before the next call.
    pub fn next_chunk(&mut self, pick: &mut impl Pick) -> Result<Option<Chunk>> {
        debug_assert!(!self.in_flight, "next_chunk called before commit");

        let candidates: Vec<usize> = self
            .progress
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.completed)
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            return Ok(None);
        }

        let item = pick.pick_item(&candidates);
        let progress = &self.progress[item];
        let wanted = pick.chunk_len().min(progress.remaining());
        let start = progress.lines_sent;
        let name = progress.name.clone();

        let source = &mut self.sources[item];
        let mut lines = Vec::with_capacity(wanted);
        for _ in 0..wanted {
            match source.next_line() {
                Ok(Some(line)) => lines.push(line),
                Ok(None) => break,
                Err(source) => return Err(ExchangeError::SourceRead { name, source }),
            }
        }
        if lines.is_empty() {
            return Err(ExchangeError::SourceRead {
                name,
                source: std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "item shrank after it was scanned",
                ),
            });
        }

        self.in_flight = true;
        Ok(Some(Chunk {
            item,
            name,
            start,
            lines,
        }))
    }

    /// Credit an acknowledged chunk to its item.
    pub fn commit(&mut self, chunk: &Chunk) {
        self.in_flight = false;
        let progress = &mut self.progress[chunk.item];
        debug_assert!(!progress.completed, "chunk committed to a completed item");
        progress.lines_sent += chunk.lines.len();
        if progress.lines_sent >= progress.total_lines {
            progress.completed = true;
            log::debug!("[sched] {} complete", progress.name);
        }
    }

    pub fn is_complete(&self) -> bool {
        self.progress.iter().all(|p| p.completed)
    }

    pub fn completed_items(&self) -> usize {
        self.progress.iter().filter(|p| p.completed).count()
    }

    pub fn progress(&self) -> &[ItemProgress] {
        &self.progress
    }
}

fn prescan(source: &mut impl LineSource) -> Result<usize> {
    let name = source.name().to_owned();
    check_item_name(&name).map_err(|e| ExchangeError::Unsendable {
        name: name.clone(),
        line: 0,
        source: e,
    })?;

    let read_err = |source| ExchangeError::SourceRead {
        name: name.clone(),
        source,
    };
    source.rewind().map_err(read_err)?;
    let mut count = 0;
    while let Some(line) = source.next_line().map_err(read_err)? {
        count += 1;
        check_line(&line).map_err(|e| ExchangeError::Unsendable {
            name: name.clone(),
            line: count,
            source: e,
        })?;
    }
    // Every offset must fit the wire's start_offset field.
    if i32::try_from(count).is_err() {
        return Err(ExchangeError::Unsendable {
            name: name.clone(),
            line: count,
            source: PacketError::OffsetOutOfRange(count),
        });
    }
    source.rewind().map_err(read_err)?;
    Ok(count)
}
