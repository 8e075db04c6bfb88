//! Outbound packet state for stop-and-wait reliability.
//!
//! [`Sender`] tracks the phase's sequence counter and the single in-flight
//! packet.  It does **not** touch the transport;
//! [`crate::connection::Connection`] calls these methods and owns the actual
//! send/receive loop.
//!
//! # Stop-and-Wait contract
//! - At most **one** packet is in flight at any moment (`unacked`).
//! - A new packet may only be recorded once `unacked` is `None`.
//! - On the matching ACK: advance `next_seq`; clear `unacked`.
//! - On timeout: increment `tx_count`; resend the same packet unchanged.
//! - An ACK ahead of the in-flight packet is a protocol violation.

use std::time::Instant;

use crate::error::{ExchangeError, Result};
use crate::packet::{DataPacket, PacketError};
use crate::scheduler::Chunk;
use crate::state::{Phase, SenderState};

/// A packet that has been sent but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetransmitEntry {
    /// The packet on the wire.
    pub packet: DataPacket,
    /// How many times this packet has been transmitted (1 = first send).
    pub tx_count: u32,
    /// Wall-clock time of the most recent transmission.
    pub sent_at: Instant,
}

/// What an inbound acknowledgment meant for the in-flight packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// The in-flight chunk was acknowledged; here it is back.
    Advanced(DataPacket),
    /// END was acknowledged with the phase sentinel.
    Finished,
    /// Old, duplicate, or foreign acknowledgment; keep waiting.
    Stale,
}

/// Stop-and-wait send-side state for one phase.
#[derive(Debug)]
pub struct Sender {
    /// Sequence number of the **next** packet to send.
    ///
    /// Starts at 0 each phase, advances by one per acknowledged chunk and
    /// never moves backwards.
    pub next_seq: i32,

    /// The in-flight packet, or `None` when the sender is idle.
    pub unacked: Option<RetransmitEntry>,

    pub state: SenderState,

    phase: Phase,
}

impl Sender {
    pub fn new(phase: Phase) -> Self {
        Self {
            next_seq: 0,
            unacked: None,
            state: SenderState::Preparing,
            phase,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Build the packet carrying `chunk`, tagged with `next_seq`.
    ///
    /// Fails when the chunk's line offset does not fit the wire field.
    pub fn build_data_packet(&self, chunk: &Chunk) -> Result<DataPacket> {
        let start_offset = i32::try_from(chunk.start).map_err(|_| ExchangeError::Unsendable {
            name: chunk.name.clone(),
            line: chunk.start + 1,
            source: PacketError::OffsetOutOfRange(chunk.start),
        })?;
        Ok(DataPacket {
            item: chunk.name.clone(),
            start_offset,
            lines: chunk.lines.clone(),
            sequence: self.next_seq,
        })
    }

    /// Build the END control packet and enter `Done`.
    pub fn build_end_packet(&mut self) -> DataPacket {
        self.state = SenderState::Done;
        DataPacket::end(self.next_seq)
    }

    /// Move `packet` into the in-flight slot (first transmission).
    ///
    /// Panics in debug mode if a packet is already in flight.
    pub fn record_sent(&mut self, packet: DataPacket) {
        debug_assert!(
            self.unacked.is_none(),
            "record_sent called while a packet is already in flight"
        );
        if self.state != SenderState::Done {
            self.state = SenderState::AwaitingAck;
        }
        self.unacked = Some(RetransmitEntry {
            packet,
            tx_count: 1,
            sent_at: Instant::now(),
        });
    }

    /// Classify an inbound acknowledgment.
    ///
    /// For a chunk, only `acked == sequence` advances.  For END, only the
    /// phase sentinel finishes.  Anything above the in-flight sequence is a
    /// protocol violation; everything else is stale.
    pub fn on_ack(&mut self, acked: i32) -> Result<AckOutcome> {
        let Some(entry) = self.unacked.as_ref() else {
            return Ok(AckOutcome::Stale);
        };
        let pending = entry.packet.sequence;

        if acked > pending {
            return Err(ExchangeError::AckFromFuture { acked, pending });
        }

        if entry.packet.is_end() {
            if acked == self.phase.end_sentinel() {
                self.unacked = None;
                return Ok(AckOutcome::Finished);
            }
            return Ok(AckOutcome::Stale);
        }

        if acked == pending {
            let entry = self.unacked.take().map(|e| e.packet);
            self.next_seq += 1;
            self.state = SenderState::Advancing;
            return Ok(entry.map_or(AckOutcome::Stale, AckOutcome::Advanced));
        }
        Ok(AckOutcome::Stale)
    }

    /// Increment the retransmit count for the in-flight packet.
    ///
    /// Called by the connection loop before each retransmission.
    pub fn on_retransmit(&mut self) {
        if let Some(ref mut e) = self.unacked {
            e.tx_count += 1;
            e.sent_at = Instant::now();
        }
    }

    /// Returns the number of times the in-flight packet has been sent,
    /// or `0` if the sender is idle.
    pub fn retransmit_count(&self) -> u32 {
        self.unacked.as_ref().map_or(0, |e| e.tx_count)
    }

    /// `true` when a packet is waiting for an ACK.
    pub fn has_unacked(&self) -> bool {
        self.unacked.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(lines: &[&str]) -> Chunk {
        Chunk {
            item: 0,
            name: "file_1.txt".into(),
            start: 0,
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }

    fn in_flight(sender: &mut Sender) -> DataPacket {
        let pkt = sender.build_data_packet(&chunk(&["a"])).unwrap();
        sender.record_sent(pkt.clone());
        pkt
    }

    #[test]
    fn offset_past_the_wire_range_is_unsendable() {
        let s = Sender::new(Phase::Upload);
        let mut far = chunk(&["a"]);
        far.start = i32::MAX as usize + 1;
        match s.build_data_packet(&far) {
            Err(ExchangeError::Unsendable { name, source, .. }) => {
                assert_eq!(name, "file_1.txt");
                assert_eq!(source, PacketError::OffsetOutOfRange(far.start));
            }
            other => panic!("expected Unsendable, got {other:?}"),
        }

        far.start = i32::MAX as usize;
        assert_eq!(s.build_data_packet(&far).unwrap().start_offset, i32::MAX);
    }

    #[test]
    fn initial_state() {
        let s = Sender::new(Phase::Upload);
        assert_eq!(s.next_seq, 0);
        assert!(!s.has_unacked());
        assert_eq!(s.retransmit_count(), 0);
        assert_eq!(s.state, SenderState::Preparing);
    }

    #[test]
    fn matching_ack_advances() {
        let mut s = Sender::new(Phase::Upload);
        let pkt = in_flight(&mut s);
        assert_eq!(s.state, SenderState::AwaitingAck);

        assert_eq!(s.on_ack(0).unwrap(), AckOutcome::Advanced(pkt));
        assert_eq!(s.next_seq, 1);
        assert!(!s.has_unacked());
        assert_eq!(s.state, SenderState::Advancing);
    }

    #[test]
    fn duplicate_ack_is_stale() {
        let mut s = Sender::new(Phase::Upload);
        in_flight(&mut s);
        s.on_ack(0).unwrap();
        in_flight(&mut s);

        assert_eq!(s.on_ack(0).unwrap(), AckOutcome::Stale);
        assert_eq!(s.next_seq, 1);
        assert!(s.has_unacked());
    }

    #[test]
    fn ack_from_the_future_is_fatal() {
        let mut s = Sender::new(Phase::Upload);
        in_flight(&mut s);
        match s.on_ack(5) {
            Err(ExchangeError::AckFromFuture { acked, pending }) => {
                assert_eq!((acked, pending), (5, 0));
            }
            other => panic!("expected AckFromFuture, got {other:?}"),
        }
    }

    #[test]
    fn sentinel_does_not_acknowledge_a_chunk() {
        let mut s = Sender::new(Phase::Upload);
        in_flight(&mut s);
        assert_eq!(s.on_ack(-2).unwrap(), AckOutcome::Stale);
        assert!(s.has_unacked());
    }

    #[test]
    fn end_finishes_only_on_its_own_sentinel() {
        let mut s = Sender::new(Phase::Upload);
        in_flight(&mut s);
        s.on_ack(0).unwrap();

        let end = s.build_end_packet();
        assert!(end.is_end());
        assert_eq!(end.sequence, 1);
        s.record_sent(end);
        assert_eq!(s.state, SenderState::Done);

        // The download sentinel and the last chunk's ack do not count.
        assert_eq!(s.on_ack(-1).unwrap(), AckOutcome::Stale);
        assert_eq!(s.on_ack(0).unwrap(), AckOutcome::Stale);
        assert_eq!(s.on_ack(-2).unwrap(), AckOutcome::Finished);
        assert!(!s.has_unacked());

        // Nothing in flight any more: late repeats change nothing.
        assert_eq!(s.on_ack(-2).unwrap(), AckOutcome::Stale);
        assert_eq!(s.state, SenderState::Done);
    }

    #[test]
    fn retransmit_keeps_the_packet_unchanged() {
        let mut s = Sender::new(Phase::Download);
        let pkt = in_flight(&mut s);
        s.on_retransmit();
        s.on_retransmit();
        assert_eq!(s.retransmit_count(), 3);
        assert_eq!(s.unacked.as_ref().map(|e| &e.packet), Some(&pkt));
        assert_eq!(s.next_seq, 0);
    }
}
