//! Selective Repeat receive-side state machine.
//!
//! [`SrReceiver`] implements the receiver side of Selective Repeat:
//!
//! - Any uncorrupted packet whose sequence number falls inside the window
//!   `[expected_seq, expected_seq + window_size)` is **buffered**, even when
//!   earlier packets are still missing.
//! - Whenever the packet at the left edge is present, the contiguous run
//!   starting there is delivered to the application and the window rotates.
//! - Every arriving packet is answered with exactly one acknowledgement.
//!   Uncorrupted packets are acked with their own sequence number, including
//!   duplicates and packets that fall outside the window.  Corrupted packets
//!   re-acknowledge `expected_seq - 1`, the last point delivered.
//!
//! Acking packets behind the window is what lets the sender recover when an
//! earlier ack was lost: its window may still lag one full window behind
//! ours, and those retransmissions would otherwise never be answered.

use crate::channel::{Application, Channel, Entity};
use crate::config::SrConfig;
use crate::packet::{Message, Packet, PAYLOAD_LEN};
use crate::seq::SeqSpace;

const ME: Entity = Entity::B;

/// Payload byte of every acknowledgement; the receiver carries no data.
pub const ACK_FILLER: u8 = b'0';

/// What happened to an arriving data packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    /// Checksum mismatch; answered with a re-ack of the last delivered point.
    Corrupted,
    /// Newly buffered.  `delivered` counts payloads passed upward as a result.
    Buffered { delivered: usize },
    /// Already buffered or already delivered; acked again, nothing stored.
    Duplicate,
    /// Outside the receive window; acked with its own number, not stored.
    OutOfWindow,
}

/// Counters mirroring what the receiver observes over its lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Packets stored for the first time.
    pub packets_received: u64,
    pub duplicates: u64,
    pub out_of_window: u64,
    pub corrupted: u64,
    /// Payloads handed to the application.
    pub delivered: u64,
    pub acks_sent: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    payload: Option<Message>,
}

impl Slot {
    fn is_received(&self) -> bool {
        self.payload.is_some()
    }
}

/// Selective Repeat receive-side state for one receiver entity.
#[derive(Debug)]
pub struct SrReceiver<C, A> {
    space: SeqSpace,

    /// Oldest sequence number not yet delivered (left window edge).
    expected_seq: i32,
    /// Sequence field of the next acknowledgement, alternating 1, 0, 1, ...
    ack_seq: i32,
    /// Buffer index of the slot for `expected_seq`.
    start: usize,
    slots: Box<[Slot]>,

    channel: C,
    app: A,
    stats: ReceiverStats,
}

impl<C: Channel, A: Application> SrReceiver<C, A> {
    /// Initialise a receiver expecting sequence number zero.
    pub fn new(config: SrConfig, channel: C, app: A) -> Self {
        Self {
            space: config.seq_space(),
            expected_seq: 0,
            ack_seq: 1,
            start: 0,
            slots: vec![Slot::default(); config.window_size()].into_boxed_slice(),
            channel,
            app,
            stats: ReceiverStats::default(),
        }
    }

    /// Process a data packet from the channel and send its acknowledgement.
    pub fn on_packet(&mut self, packet: &Packet) -> RecvOutcome {
        let (outcome, ack) = if packet.is_corrupted() {
            self.stats.corrupted += 1;
            let ack = self.space.prev(self.expected_seq);
            log::debug!("[sr:{ME}] ← corrupted DATA; re-ack {ack}");
            (RecvOutcome::Corrupted, ack)
        } else {
            (self.accept(packet), packet.seq)
        };

        let response = Packet::new(self.ack_seq, ack, [ACK_FILLER; PAYLOAD_LEN]);
        self.ack_seq ^= 1;
        self.channel.send(response);
        self.stats.acks_sent += 1;
        log::debug!("[sr:{ME}] → ACK {ack} ({outcome:?}) expected={}", self.expected_seq);

        outcome
    }

    fn accept(&mut self, packet: &Packet) -> RecvOutcome {
        let relative = match self.space.offset(packet.seq, self.expected_seq) {
            Some(r) if r < self.slots.len() => r,
            _ => {
                self.stats.out_of_window += 1;
                log::debug!(
                    "[sr:{ME}] ← DATA seq={} outside window expected={}",
                    packet.seq,
                    self.expected_seq
                );
                return RecvOutcome::OutOfWindow;
            }
        };

        let pos = self.slot_index(relative);
        if self.slots[pos].is_received() {
            self.stats.duplicates += 1;
            log::debug!("[sr:{ME}] ← duplicate DATA seq={}", packet.seq);
            return RecvOutcome::Duplicate;
        }

        self.slots[pos].payload = Some(packet.payload);
        self.stats.packets_received += 1;
        log::debug!("[sr:{ME}] ← DATA seq={} buffered at +{relative}", packet.seq);

        RecvOutcome::Buffered {
            delivered: self.deliver_in_order(),
        }
    }

    /// Pass the contiguous run at the left edge upward and rotate past it.
    fn deliver_in_order(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(payload) = self.slots[self.start].payload.take() {
            self.app.deliver(&payload);
            self.start = (self.start + 1) % self.slots.len();
            self.expected_seq = self.space.next(self.expected_seq);
            delivered += 1;
        }
        self.stats.delivered += delivered as u64;
        delivered
    }

    fn slot_index(&self, offset: usize) -> usize {
        (self.start + offset) % self.slots.len()
    }
}

impl<C, A> SrReceiver<C, A> {
    pub fn expected_seq(&self) -> i32 {
        self.expected_seq
    }

    /// Sequence numbers buffered but not yet deliverable, in window order.
    pub fn buffered(&self) -> Vec<i32> {
        (0..self.slots.len())
            .filter(|&i| self.slots[(self.start + i) % self.slots.len()].is_received())
            .map(|i| self.space.add(self.expected_seq, i))
            .collect()
    }

    pub fn window_size(&self) -> usize {
        self.slots.len()
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut A {
        &mut self.app
    }
}
