//! Selective Repeat send-side state machine.
//!
//! [`SrSender`] keeps up to `window_size` packets in flight.  Each one is
//! acknowledged **individually**: an ack for sequence number `n` marks only
//! the slot holding `n`, and the window slides forward over the contiguous
//! run of acknowledged slots at its left edge.
//!
//! # Protocol contract
//!
//! - At most `window_size` packets are outstanding; further submissions are
//!   rejected with [`SubmitOutcome::WindowFull`] and not buffered.
//! - A single timer covers the whole window.  It is started when the first
//!   packet enters an empty window, restarted whenever a new ack slides or
//!   marks the window, and stopped once nothing is outstanding.
//! - On timeout every unacknowledged packet is resent unchanged and the timer
//!   is restarted.  There is no backoff.
//! - Corrupted acks, acks outside the window and repeated acks leave the
//!   state (and the timer) untouched.
//!
//! # Buffer layout
//!
//! ```text
//!               start                 start + count
//!                 │                        │
//!  slots:  [ .. | P(base) | P(base+1) | .. | free .. ]   (indices mod window)
//!                 │
//!  seq:       window_base ─────────────▶ next_seq
//! ```

use crate::channel::{Channel, Entity};
use crate::config::SrConfig;
use crate::packet::{Message, Packet};
use crate::seq::SeqSpace;
use crate::timer::TimerControl;

const ME: Entity = Entity::A;

/// Result of [`SrSender::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum SubmitOutcome {
    /// Packetised and handed to the channel.
    Sent { seq: i32 },
    /// The window is full; the message was dropped and must be resubmitted
    /// later by the caller.
    WindowFull,
}

/// Result of [`SrSender::on_ack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Checksum mismatch; ignored.
    Corrupted,
    /// Names a sequence number that is not currently in flight.
    OutOfWindow,
    /// The slot was already acknowledged.
    Duplicate,
    /// First acknowledgement of an in-flight packet.  `slid` is how many
    /// slots the window advanced as a result (possibly zero).
    Accepted { slid: usize },
}

/// Counters mirroring what the sender observes over its lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SenderStats {
    /// Messages accepted into the window and sent for the first time.
    pub messages_sent: u64,
    /// Submissions rejected because the window was full.
    pub window_full: u64,
    /// Uncorrupted acks received, whether useful or not.
    pub acks_received: u64,
    /// Acks that acknowledged a packet for the first time.
    pub new_acks: u64,
    pub corrupted_acks: u64,
    pub packets_resent: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    packet: Option<Packet>,
    acked: bool,
}

/// Selective Repeat send-side state for one sender entity.
#[derive(Debug)]
pub struct SrSender<C, T> {
    config: SrConfig,
    space: SeqSpace,

    /// Oldest unacknowledged sequence number (left window edge).
    window_base: i32,
    /// Sequence number for the next new packet.
    next_seq: i32,
    /// Packets currently occupying the window.
    window_count: usize,
    /// Buffer index of the slot holding `window_base`.
    start: usize,
    slots: Box<[Slot]>,

    channel: C,
    timer: T,
    stats: SenderStats,
}

impl<C: Channel, T: TimerControl> SrSender<C, T> {
    /// Initialise an idle sender: sequence numbers start at zero and every
    /// slot is free.
    pub fn new(config: SrConfig, channel: C, timer: T) -> Self {
        Self {
            config,
            space: config.seq_space(),
            window_base: 0,
            next_seq: 0,
            window_count: 0,
            start: 0,
            slots: vec![Slot::default(); config.window_size()].into_boxed_slice(),
            channel,
            timer,
            stats: SenderStats::default(),
        }
    }

    /// Packetise `message` and send it if the window has room.
    pub fn submit(&mut self, message: Message) -> SubmitOutcome {
        if !self.can_submit() {
            self.stats.window_full += 1;
            log::debug!(
                "[sr:{ME}] window full ({}/{}); message rejected",
                self.window_count,
                self.window_size()
            );
            return SubmitOutcome::WindowFull;
        }

        let seq = self.next_seq;
        let packet = Packet::data(seq, message);

        let pos = self.slot_index(self.window_count);
        self.slots[pos] = Slot {
            packet: Some(packet),
            acked: false,
        };
        self.window_count += 1;

        self.channel.send(packet);
        self.stats.messages_sent += 1;
        log::debug!("[sr:{ME}] → DATA seq={seq} in_flight={}", self.window_count);

        if self.window_count == 1 {
            self.timer.start(self.config.timeout());
        }

        self.next_seq = self.space.next(self.next_seq);
        SubmitOutcome::Sent { seq }
    }

    /// Process an acknowledgement packet from the channel.
    pub fn on_ack(&mut self, packet: &Packet) -> AckOutcome {
        if packet.is_corrupted() {
            self.stats.corrupted_acks += 1;
            log::debug!("[sr:{ME}] ← corrupted ACK; ignored");
            return AckOutcome::Corrupted;
        }
        self.stats.acks_received += 1;

        // Only sequence numbers actually in flight can be acknowledged.
        let relative = match self.space.offset(packet.ack, self.window_base) {
            Some(r) if r < self.window_count => r,
            _ => {
                log::debug!(
                    "[sr:{ME}] ← ACK {} outside window base={} count={}",
                    packet.ack,
                    self.window_base,
                    self.window_count
                );
                return AckOutcome::OutOfWindow;
            }
        };

        let pos = self.slot_index(relative);
        if self.slots[pos].acked {
            log::debug!("[sr:{ME}] ← duplicate ACK {}", packet.ack);
            return AckOutcome::Duplicate;
        }
        self.slots[pos].acked = true;
        self.stats.new_acks += 1;

        let slid = self.slide();
        log::debug!(
            "[sr:{ME}] ← ACK {} (slid {slid}) base={} in_flight={}",
            packet.ack,
            self.window_base,
            self.window_count
        );

        self.timer.stop();
        if self.window_count > 0 {
            self.timer.start(self.config.timeout());
        }
        AckOutcome::Accepted { slid }
    }

    /// Resend every unacknowledged packet in the window and restart the timer.
    ///
    /// Returns the number of packets resent.
    pub fn on_timeout(&mut self) -> usize {
        let mut resent = 0;
        for i in 0..self.window_count {
            let slot = self.slots[self.slot_index(i)];
            if slot.acked {
                continue;
            }
            if let Some(packet) = slot.packet {
                log::debug!("[sr:{ME}] timeout → resend seq={}", packet.seq);
                self.channel.send(packet);
                resent += 1;
            }
        }
        self.stats.packets_resent += resent as u64;
        log::debug!("[sr:{ME}] timeout, resent {resent} packet(s)");

        self.timer.start(self.config.timeout());
        resent
    }

    /// Release the contiguous acknowledged prefix of the window.
    fn slide(&mut self) -> usize {
        let mut slid = 0;
        while self.window_count > 0 && self.slots[self.start].acked {
            self.slots[self.start] = Slot::default();
            self.start = (self.start + 1) % self.slots.len();
            self.window_base = self.space.next(self.window_base);
            self.window_count -= 1;
            slid += 1;
        }
        slid
    }

    fn slot_index(&self, offset: usize) -> usize {
        (self.start + offset) % self.slots.len()
    }
}

impl<C, T> SrSender<C, T> {
    /// `true` while the window has room for another packet.
    pub fn can_submit(&self) -> bool {
        self.window_count < self.slots.len()
    }

    pub fn window_base(&self) -> i32 {
        self.window_base
    }

    pub fn next_seq(&self) -> i32 {
        self.next_seq
    }

    /// Packets in the window, acknowledged or not.
    pub fn in_flight(&self) -> usize {
        self.window_count
    }

    pub fn window_size(&self) -> usize {
        self.slots.len()
    }

    /// In-window packets from oldest to newest, paired with their
    /// acknowledged flag.
    pub fn outstanding(&self) -> impl Iterator<Item = (&Packet, bool)> + '_ {
        (0..self.window_count).filter_map(move |i| {
            let slot = &self.slots[(self.start + i) % self.slots.len()];
            slot.packet.as_ref().map(|p| (p, slot.acked))
        })
    }

    pub fn config(&self) -> &SrConfig {
        &self.config
    }

    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::channel::Outbox;
    use crate::packet::PAYLOAD_LEN;
    use crate::timer::TimerState;

    type TestSender = SrSender<Outbox, TimerState>;

    fn sender(window: usize, space: usize) -> TestSender {
        let config = SrConfig::new(window, space, Duration::from_millis(16)).unwrap();
        SrSender::new(config, Outbox::new(), TimerState::new())
    }

    fn msg(i: usize) -> Message {
        [b'a' + (i % 26) as u8; PAYLOAD_LEN]
    }

    fn ack(n: i32) -> Packet {
        Packet::new(0, n, [b'0'; PAYLOAD_LEN])
    }

    fn sent_seqs(s: &mut TestSender) -> Vec<i32> {
        s.channel_mut().drain().map(|p| p.seq).collect()
    }

    #[test]
    fn initial_state() {
        let s = sender(6, 12);
        assert_eq!(s.window_base(), 0);
        assert_eq!(s.next_seq(), 0);
        assert_eq!(s.in_flight(), 0);
        assert!(s.can_submit());
        assert!(!s.timer().is_armed());
    }

    #[test]
    fn submit_sends_data_packet_and_arms_timer_once() {
        let mut s = sender(6, 12);
        assert_eq!(s.submit(msg(0)), SubmitOutcome::Sent { seq: 0 });
        assert_eq!(s.timer().generation(), 1);
        assert_eq!(s.submit(msg(1)), SubmitOutcome::Sent { seq: 1 });
        // Second packet does not touch the timer.
        assert_eq!(s.timer().generation(), 1);

        let sent: Vec<Packet> = s.channel_mut().drain().collect();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].ack, crate::packet::NOT_IN_USE);
        assert!(!sent[0].is_corrupted());
        assert_eq!(sent[1].payload, msg(1));
        assert_eq!(s.next_seq(), 2);
    }

    #[test]
    fn window_full_rejects_without_state_change() {
        let mut s = sender(2, 4);
        let _ = s.submit(msg(0));
        let _ = s.submit(msg(1));
        assert!(!s.can_submit());

        assert_eq!(s.submit(msg(2)), SubmitOutcome::WindowFull);
        assert_eq!(s.next_seq(), 2);
        assert_eq!(s.in_flight(), 2);
        assert_eq!(s.stats().window_full, 1);
        assert_eq!(s.channel().len(), 2);
    }

    #[test]
    fn corrupted_ack_is_ignored() {
        let mut s = sender(4, 8);
        let _ = s.submit(msg(0));
        let generation = s.timer().generation();

        let mut bad = ack(0);
        bad.ack = 999_999;
        assert_eq!(s.on_ack(&bad), AckOutcome::Corrupted);
        assert_eq!(s.window_base(), 0);
        assert_eq!(s.timer().generation(), generation);
        assert_eq!(s.stats().corrupted_acks, 1);
    }

    #[test]
    fn out_of_order_ack_marks_without_sliding() {
        let mut s = sender(4, 8);
        for i in 0..3 {
            let _ = s.submit(msg(i));
        }
        assert_eq!(s.on_ack(&ack(1)), AckOutcome::Accepted { slid: 0 });
        assert_eq!(s.window_base(), 0);
        assert_eq!(s.in_flight(), 3);

        // Acking the base now releases 0 and 1 together.
        assert_eq!(s.on_ack(&ack(0)), AckOutcome::Accepted { slid: 2 });
        assert_eq!(s.window_base(), 2);
        assert_eq!(s.in_flight(), 1);
        assert!(s.timer().is_armed());
    }

    #[test]
    fn duplicate_ack_changes_nothing() {
        let mut s = sender(4, 8);
        for i in 0..2 {
            let _ = s.submit(msg(i));
        }
        let _ = s.on_ack(&ack(1));
        let generation = s.timer().generation();

        assert_eq!(s.on_ack(&ack(1)), AckOutcome::Duplicate);
        assert_eq!(s.timer().generation(), generation);
        assert_eq!(s.stats().new_acks, 1);
        assert_eq!(s.stats().acks_received, 2);
    }

    #[test]
    fn stale_ack_behind_base_is_out_of_window() {
        let mut s = sender(4, 8);
        let _ = s.submit(msg(0));
        let _ = s.submit(msg(1));
        let _ = s.on_ack(&ack(0));
        assert_eq!(s.window_base(), 1);

        assert_eq!(s.on_ack(&ack(0)), AckOutcome::OutOfWindow);
        assert_eq!(s.window_base(), 1);
    }

    #[test]
    fn ack_for_unsent_sequence_is_out_of_window() {
        let mut s = sender(4, 8);
        let _ = s.submit(msg(0));
        assert_eq!(s.on_ack(&ack(2)), AckOutcome::OutOfWindow);
        assert_eq!(s.on_ack(&ack(crate::packet::NOT_IN_USE)), AckOutcome::OutOfWindow);
    }

    #[test]
    fn last_ack_stops_timer() {
        let mut s = sender(4, 8);
        let _ = s.submit(msg(0));
        assert_eq!(s.on_ack(&ack(0)), AckOutcome::Accepted { slid: 1 });
        assert_eq!(s.in_flight(), 0);
        assert!(!s.timer().is_armed());
    }

    #[test]
    fn timeout_resends_only_unacked() {
        let mut s = sender(4, 8);
        for i in 0..4 {
            let _ = s.submit(msg(i));
        }
        let _ = s.on_ack(&ack(2));
        s.channel_mut().drain().for_each(drop);

        assert_eq!(s.on_timeout(), 3);
        assert_eq!(sent_seqs(&mut s), vec![0, 1, 3]);
        assert!(s.timer().is_armed());
        assert_eq!(s.stats().packets_resent, 3);
    }

    #[test]
    fn timeout_on_empty_window_still_restarts_timer() {
        let mut s = sender(4, 8);
        assert_eq!(s.on_timeout(), 0);
        assert!(s.timer().is_armed());
    }

    #[test]
    fn sequence_numbers_wrap_around_space() {
        let mut s = sender(2, 4);
        let mut seqs = Vec::new();
        for i in 0..6 {
            match s.submit(msg(i)) {
                SubmitOutcome::Sent { seq } => seqs.push(seq),
                SubmitOutcome::WindowFull => panic!("window unexpectedly full"),
            }
            let _ = s.on_ack(&ack(seqs[i]));
        }
        assert_eq!(seqs, vec![0, 1, 2, 3, 0, 1]);
        assert_eq!(s.window_base(), 2);
        assert_eq!(s.next_seq(), 2);
    }

    #[test]
    fn buffer_start_wraps_with_partial_acks() {
        let mut s = sender(3, 6);
        for i in 0..3 {
            let _ = s.submit(msg(i));
        }
        let _ = s.on_ack(&ack(0));
        let _ = s.on_ack(&ack(1));
        let _ = s.submit(msg(3));
        let _ = s.submit(msg(4));

        let window: Vec<i32> = s.outstanding().map(|(p, _)| p.seq).collect();
        assert_eq!(window, vec![2, 3, 4]);
        assert_eq!(s.on_ack(&ack(4)), AckOutcome::Accepted { slid: 0 });
        assert_eq!(s.on_ack(&ack(2)), AckOutcome::Accepted { slid: 1 });
        assert_eq!(s.on_ack(&ack(3)), AckOutcome::Accepted { slid: 2 });
        assert_eq!(s.in_flight(), 0);
        assert_eq!(s.window_base(), 5);
    }
}
