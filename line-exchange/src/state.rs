//! Finite-state machine types for both ends of a phase.
//!
//! Transitions are driven in [`crate::connection`]; this module only names
//! the states and holds the per-phase bookkeeping.
//!
//! ```text
//! Sender:    PREPARING ──send──▶ AWAITING_ACK ──ack──▶ ADVANCING
//!                ▲                  │    ▲                 │
//!                │                  └────┘ timeout:        │
//!                │                        resend same      │
//!                └──────── items left ◀────────────────────┤
//!                                                          ▼ all items done
//!                                                        DONE ──END acked──▶ (phase over)
//!
//! Receiver:  LISTENING ──packet──▶ PROCESSING ──ack sent──▶ ACKED ──▶ LISTENING
//!                                      │
//!                                      └── END ──▶ (grace window) ──▶ phase over
//! ```

use crate::packet::{DOWNLOAD_END_ACK, UPLOAD_END_ACK};

/// Which direction of the session a phase belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Client → server, many small items.
    Upload,
    /// Server → client, the single merged artifact.
    Download,
}

impl Phase {
    /// Acknowledgment value confirming this phase's END packet.
    pub fn end_sentinel(self) -> i32 {
        match self {
            Phase::Upload => UPLOAD_END_ACK,
            Phase::Download => DOWNLOAD_END_ACK,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Upload => f.write_str("upload"),
            Phase::Download => f.write_str("download"),
        }
    }
}

/// States of the stop-and-wait sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    /// Choosing and assembling the next chunk.
    #[default]
    Preparing,
    /// One packet in flight, waiting for its acknowledgment.
    AwaitingAck,
    /// Acknowledgment received; counters being moved forward.
    Advancing,
    /// Every item sent; END in flight or acknowledged.
    Done,
}

/// States of the sequenced receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverState {
    #[default]
    Listening,
    Processing,
    Acked,
}

/// Per-phase bookkeeping shared by the loop and its report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseState {
    pub phase: Phase,
    /// Items fully sent (sender) or first seen (receiver) so far.
    pub completed_items: usize,
}

impl PhaseState {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            completed_items: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_differ_per_phase() {
        assert_eq!(Phase::Upload.end_sentinel(), -2);
        assert_eq!(Phase::Download.end_sentinel(), -1);
    }

    #[test]
    fn machines_start_idle() {
        assert_eq!(SenderState::default(), SenderState::Preparing);
        assert_eq!(ReceiverState::default(), ReceiverState::Listening);
        let st = PhaseState::new(Phase::Upload);
        assert_eq!(st.phase, Phase::Upload);
        assert_eq!(st.completed_items, 0);
    }
}
