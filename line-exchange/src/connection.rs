//! Phase loops over a datagram transport.
//!
//! A [`Connection`] owns the transport for the whole session and runs one
//! phase at a time, in either role:
//! - [`Connection::send_items`] drives a [`Sender`] with chunks from a
//!   [`Scheduler`], one packet in flight, until END is acknowledged.
//! - [`Connection::receive_items`] feeds inbound packets to a [`Receiver`],
//!   sends the acknowledgments it asks for, and lingers after END.
//!
//! Every wait is a single receive bounded by a deadline.  A datagram that
//! does not decode is logged and dropped; the peer's retransmission
//! recovers from it.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::ExchangeConfig;
use crate::error::Result;
use crate::lines::{LineSource, SinkFactory};
use crate::packet::{Ack, DataPacket, Message};
use crate::receiver::{ReceivedItem, Receiver, Verdict};
use crate::scheduler::{Pick, Scheduler};
use crate::sender::{AckOutcome, Sender};
use crate::state::{Phase, PhaseState};
use crate::timer::RetransmitTimer;
use crate::transport::Transport;

/// Counters from one send phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Datagrams put on the wire, retransmissions and END included.
    pub packets: u64,
    /// Datagrams that were repeats of a packet already sent.
    pub retransmissions: u64,
    /// Acknowledgments that did not match the packet in flight.
    pub stale_acks: u64,
    /// END packets of the previous phase answered while sending.
    pub trailing_end_acks: u64,
    /// Items fully delivered.
    pub items: usize,
}

/// One endpoint of a session.
pub struct Connection<T> {
    transport: T,
    config: ExchangeConfig,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T, config: ExchangeConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Deliver every item of `scheduler`, then END.
    ///
    /// `trailing_end_ack` is the sentinel of the phase that came before this
    /// one, if any.  An END from the peer seen while sending means the peer
    /// never got that acknowledgment, so it is sent again.
    pub async fn send_items<S: LineSource>(
        &mut self,
        phase: Phase,
        scheduler: &mut Scheduler<S>,
        pick: &mut impl Pick,
        trailing_end_ack: Option<i32>,
    ) -> Result<SendReport> {
        let mut sender = Sender::new(phase);
        let mut state = PhaseState::new(phase);
        let mut report = SendReport::default();

        while let Some(chunk) = scheduler.next_chunk(pick)? {
            let pkt = sender.build_data_packet(&chunk)?;
            log::debug!(
                "[send] {phase} seq={} {} lines {}..{}",
                pkt.sequence,
                pkt.item,
                chunk.start,
                chunk.start + chunk.lines.len()
            );
            self.deliver(&mut sender, pkt, trailing_end_ack, &mut report)
                .await?;
            scheduler.commit(&chunk);
        }

        state.completed_items = scheduler.completed_items();
        let end = sender.build_end_packet();
        log::debug!("[send] {phase} seq={} END", end.sequence);
        self.deliver(&mut sender, end, trailing_end_ack, &mut report)
            .await?;

        report.items = state.completed_items;
        log::info!(
            "[send] {phase} complete: {} item(s), {} packet(s), {} retransmission(s)",
            report.items,
            report.packets,
            report.retransmissions
        );
        Ok(report)
    }

    /// Send `packet` and wait until it is acknowledged, retransmitting the
    /// same bytes on every timeout.
    async fn deliver(
        &mut self,
        sender: &mut Sender,
        packet: DataPacket,
        trailing_end_ack: Option<i32>,
        report: &mut SendReport,
    ) -> Result<()> {
        let sequence = packet.sequence;
        let bytes = Message::Data(packet.clone()).encode()?;
        let mut timer = RetransmitTimer::new(&self.config);

        self.transport.send(&bytes).await?;
        sender.record_sent(packet);
        report.packets += 1;
        let mut deadline = timer.arm();

        loop {
            match self.recv_message(deadline).await? {
                None => {
                    let attempt = timer.on_timeout(sequence)?;
                    log::debug!("[send] no ack for seq={sequence}; retransmission #{attempt}");
                    self.transport.send(&bytes).await?;
                    sender.on_retransmit();
                    report.packets += 1;
                    report.retransmissions += 1;
                    deadline = timer.arm();
                }
                Some(Message::Ack(Ack { acked })) => match sender.on_ack(acked)? {
                    AckOutcome::Advanced(_) | AckOutcome::Finished => {
                        log::debug!("[send] ack {acked}");
                        return Ok(());
                    }
                    AckOutcome::Stale => {
                        report.stale_acks += 1;
                        log::debug!("[send] stale ack {acked} while waiting for seq={sequence}");
                    }
                },
                Some(Message::Data(data)) if data.is_end() => match trailing_end_ack {
                    Some(sentinel) => {
                        log::debug!("[send] peer repeated END of the previous phase; ack {sentinel}");
                        self.send_ack(sentinel).await?;
                        report.trailing_end_acks += 1;
                    }
                    None => log::debug!("[send] ignoring END from peer"),
                },
                Some(Message::Data(data)) => {
                    log::debug!(
                        "[send] ignoring data seq={} from peer while sending",
                        data.sequence
                    );
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Receiving
    // -----------------------------------------------------------------------

    /// Accept packets until END, linger for the grace window, then close the
    /// receiver and return what it captured.
    pub async fn receive_items<F: SinkFactory>(
        &mut self,
        mut receiver: Receiver<F>,
    ) -> Result<Vec<ReceivedItem>> {
        let phase = receiver.phase();
        let poll = self.config.ack_timeout;

        let sentinel = loop {
            let Some(msg) = self.recv_message(Instant::now() + poll).await? else {
                log::debug!(
                    "[recv] {phase} idle; last accepted seq={}",
                    receiver.last_accepted
                );
                continue;
            };
            let pkt = match msg {
                Message::Data(pkt) => pkt,
                Message::Ack(Ack { acked }) => {
                    log::debug!("[recv] ignoring ack {acked}");
                    continue;
                }
            };

            match receiver.on_packet(&pkt)? {
                Verdict::Accepted(seq) => {
                    log::debug!(
                        "[recv] {phase} seq={seq} {} +{} line(s)",
                        pkt.item,
                        pkt.lines.len()
                    );
                    self.send_ack(seq).await?;
                }
                Verdict::Duplicate(seq) => {
                    log::debug!("[recv] duplicate seq={seq}; ack again");
                    self.send_ack(seq).await?;
                }
                Verdict::Stale => {
                    log::debug!(
                        "[recv] dropping old seq={} (last accepted {})",
                        pkt.sequence,
                        receiver.last_accepted
                    );
                }
                Verdict::End(sentinel) => {
                    self.send_ack(sentinel).await?;
                    break sentinel;
                }
            }
        };

        log::info!(
            "[recv] {phase} END after seq={}; lingering {:?}",
            receiver.last_accepted,
            self.config.grace
        );
        self.linger(sentinel, self.config.grace).await?;

        let items = receiver.close()?;
        log::info!("[recv] {phase} complete: {} item(s)", items.len());
        Ok(items)
    }

    /// Re-acknowledge repeated END packets until `grace` has passed.
    async fn linger(&mut self, sentinel: i32, grace: Duration) -> Result<()> {
        let deadline = Instant::now() + grace;
        while let Some(msg) = self.recv_message(deadline).await? {
            match msg {
                Message::Data(pkt) if pkt.is_end() => {
                    log::debug!("[recv] END repeated; ack {sentinel} again");
                    self.send_ack(sentinel).await?;
                }
                other => log::trace!("[recv] ignoring {other:?} during grace window"),
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Wire helpers
    // -----------------------------------------------------------------------

    async fn send_ack(&mut self, acked: i32) -> Result<()> {
        let bytes = Message::Ack(Ack { acked }).encode()?;
        self.transport.send(&bytes).await?;
        Ok(())
    }

    /// Next well-formed message arriving before `deadline`, or `None`.
    async fn recv_message(&mut self, deadline: Instant) -> Result<Option<Message>> {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let Some(datagram) = self.transport.recv(deadline - now).await? else {
                return Ok(None);
            };
            match Message::decode(&datagram) {
                Ok(msg) => return Ok(Some(msg)),
                Err(e) => log::warn!(
                    "[conn] dropping malformed datagram ({} bytes): {e}",
                    datagram.len()
                ),
            }
        }
    }
}
