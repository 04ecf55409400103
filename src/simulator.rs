//! Deterministic discrete-event simulator for exercising the protocol.
//!
//! Real networks drop, reorder and corrupt packets.  To exercise the
//! reliability mechanisms reproducibly, [`Simulation`] hosts one
//! [`SrSender`] (entity A) and one [`SrReceiver`] (entity B) on a virtual
//! clock and connects them through a fault-injecting channel:
//!
//! | Fault        | Description                                              |
//! |--------------|----------------------------------------------------------|
//! | Loss         | Drop a packet with probability `loss_rate`.              |
//! | Corruption   | Overwrite a field with probability `corrupt_rate`.       |
//! | Delay        | Uniform one-way delay in `[min_delay, max_delay]`.       |
//! | Reordering   | With `reorder` set, later packets may overtake earlier.  |
//!
//! Corruption mirrors a classic textbook emulator: three times out of four
//! the first payload byte becomes `'Z'`, otherwise the sequence or ack field
//! is overwritten with `999999`.  The checksum is never touched.
//!
//! Events are processed strictly one at a time; ties on the clock are broken
//! by scheduling order, so a fixed `seed` always replays the same run.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::channel::{Entity, Inbox, Outbox};
use crate::config::SrConfig;
use crate::packet::{Message, Packet, PAYLOAD_LEN};
use crate::sr_receiver::{ReceiverStats, SrReceiver};
use crate::sr_sender::{SenderStats, SrSender, SubmitOutcome};
use crate::timer::TimerState;

/// Value written into a corrupted header field.
const CORRUPT_FIELD: i32 = 999_999;

/// Fault model and workload for one simulation run.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Number of application messages to generate.
    pub messages: usize,
    /// Mean time between generated messages; actual gaps are uniform in
    /// `[0, 2 * message_interval]`.
    pub message_interval: Duration,
    /// Probability that any given packet is silently dropped.
    pub loss_rate: f64,
    /// Probability that a surviving packet is corrupted.
    pub corrupt_rate: f64,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Allow packets to arrive out of send order.
    ///
    /// Delays stay bounded by `max_delay`.  If that bound lets a packet
    /// outlive a full cycle of the sequence space, the protocol can no longer
    /// tell old from new and delivery breaks; keep the space generous.
    pub reorder: bool,
    /// Queue messages that hit a full window and resubmit them as room opens,
    /// instead of dropping them.
    pub hold_when_full: bool,
    /// Virtual time after which the run is abandoned.
    pub time_limit: Duration,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default: the channel is a transparent FIFO.
        Self {
            messages: 20,
            message_interval: Duration::from_millis(10),
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            reorder: false,
            hold_when_full: false,
            time_limit: Duration::from_secs(3600),
            seed: 0,
        }
    }
}

/// Reasons a [`SimulatorConfig`] can be rejected.
#[derive(Debug, Error, PartialEq)]
pub enum SimulatorError {
    #[error("{name} must be within [0, 1], got {value}")]
    BadProbability { name: &'static str, value: f64 },
    #[error("min_delay {min:?} exceeds max_delay {max:?}")]
    BadDelayRange { min: Duration, max: Duration },
}

impl SimulatorConfig {
    fn validate(&self) -> Result<(), SimulatorError> {
        for (name, value) in [("loss_rate", self.loss_rate), ("corrupt_rate", self.corrupt_rate)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SimulatorError::BadProbability { name, value });
            }
        }
        if self.min_delay > self.max_delay {
            return Err(SimulatorError::BadDelayRange {
                min: self.min_delay,
                max: self.max_delay,
            });
        }
        Ok(())
    }
}

/// What the channel did with the packets handed to it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStats {
    pub to_b: u64,
    pub to_a: u64,
    pub lost: u64,
    pub corrupted: u64,
}

/// Outcome of a completed [`Simulation::run`].
#[derive(Debug, Clone)]
pub struct SimReport {
    pub sender: SenderStats,
    pub receiver: ReceiverStats,
    pub channel: ChannelStats,
    pub messages_generated: usize,
    /// Messages rejected with a full window and never resubmitted.
    pub messages_dropped: usize,
    /// Messages the sender accepted, in acceptance order.
    pub accepted: Vec<Message>,
    /// Payloads the receiver delivered, in delivery order.
    pub delivered: Vec<Message>,
    /// Virtual time of the last processed event.
    pub elapsed: Duration,
    /// `false` when the run hit `time_limit` with events still pending.
    pub completed: bool,
}

impl SimReport {
    /// `true` when every accepted message was delivered exactly once, in order.
    pub fn delivered_in_order(&self) -> bool {
        self.accepted == self.delivered
    }
}

impl fmt::Display for SimReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Simulation finished at {:?}{}", self.elapsed, if self.completed { "" } else { " (time limit)" })?;
        writeln!(f, "  messages generated:        {}", self.messages_generated)?;
        writeln!(f, "  messages accepted by A:    {}", self.accepted.len())?;
        writeln!(f, "  messages dropped (full):   {}", self.messages_dropped)?;
        writeln!(f, "  window-full rejections:    {}", self.sender.window_full)?;
        writeln!(f, "  packets sent A → B:        {}", self.channel.to_b)?;
        writeln!(f, "  packets sent B → A:        {}", self.channel.to_a)?;
        writeln!(f, "  packets lost:              {}", self.channel.lost)?;
        writeln!(f, "  packets corrupted:         {}", self.channel.corrupted)?;
        writeln!(f, "  packets resent by A:       {}", self.sender.packets_resent)?;
        writeln!(f, "  ACKs received by A:        {}", self.sender.acks_received)?;
        writeln!(f, "  new ACKs:                  {}", self.sender.new_acks)?;
        writeln!(f, "  packets buffered by B:     {}", self.receiver.packets_received)?;
        writeln!(f, "  messages delivered by B:   {}", self.delivered.len())?;
        write!(f, "  delivered in order:        {}", self.delivered_in_order())
    }
}

#[derive(Debug)]
enum Event {
    Generate,
    Arrive { to: Entity, packet: Packet },
    Timeout { generation: u64 },
}

#[derive(Debug)]
struct Scheduled {
    at: Duration,
    order: u64,
    event: Event,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed so the max-heap pops the earliest event first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.at, other.order).cmp(&(self.at, self.order))
    }
}

/// A sender and a receiver joined by a simulated unreliable channel.
pub struct Simulation {
    config: SimulatorConfig,
    rng: StdRng,
    now: Duration,
    queue: BinaryHeap<Scheduled>,
    next_order: u64,

    sender: SrSender<Outbox, TimerState>,
    receiver: SrReceiver<Outbox, Inbox>,
    timer_generation: u64,

    /// Latest scheduled arrival per destination, for FIFO delivery.
    last_arrival: [Duration; 2],
    backlog: VecDeque<Message>,
    generated: usize,
    dropped: usize,
    accepted: Vec<Message>,
    channel: ChannelStats,
}

impl Simulation {
    pub fn new(protocol: SrConfig, config: SimulatorConfig) -> Result<Self, SimulatorError> {
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);
        let mut sim = Self {
            config,
            rng,
            now: Duration::ZERO,
            queue: BinaryHeap::new(),
            next_order: 0,
            sender: SrSender::new(protocol, Outbox::new(), TimerState::new()),
            receiver: SrReceiver::new(protocol, Outbox::new(), Inbox::new()),
            timer_generation: 0,
            last_arrival: [Duration::ZERO; 2],
            backlog: VecDeque::new(),
            generated: 0,
            dropped: 0,
            accepted: Vec::new(),
            channel: ChannelStats::default(),
        };
        if sim.config.messages > 0 {
            let gap = sim.next_gap();
            sim.schedule(gap, Event::Generate);
        }
        Ok(sim)
    }

    /// Process events until none remain or the time limit is reached.
    pub fn run(mut self) -> SimReport {
        log::info!(
            "[sim] start: {} messages, loss={} corrupt={} seed={}",
            self.config.messages,
            self.config.loss_rate,
            self.config.corrupt_rate,
            self.config.seed
        );

        let mut completed = true;
        while let Some(next) = self.queue.pop() {
            if next.at > self.config.time_limit {
                completed = false;
                break;
            }
            self.now = next.at;
            self.dispatch(next.event);
            self.flush();
        }

        log::info!("[sim] finished at {:?}", self.now);
        SimReport {
            sender: *self.sender.stats(),
            receiver: *self.receiver.stats(),
            channel: self.channel,
            messages_generated: self.generated,
            messages_dropped: self.dropped,
            accepted: self.accepted,
            delivered: self.receiver.app().delivered().to_vec(),
            elapsed: self.now,
            completed,
        }
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::Generate => {
                let message = generated_message(self.generated);
                self.generated += 1;
                if self.generated < self.config.messages {
                    let gap = self.next_gap();
                    self.schedule(gap, Event::Generate);
                }

                if self.config.hold_when_full {
                    self.backlog.push_back(message);
                } else {
                    match self.sender.submit(message) {
                        SubmitOutcome::Sent { .. } => self.accepted.push(message),
                        SubmitOutcome::WindowFull => self.dropped += 1,
                    }
                }
            }
            Event::Arrive { to: Entity::A, packet } => {
                self.sender.on_ack(&packet);
            }
            Event::Arrive { to: Entity::B, packet } => {
                self.receiver.on_packet(&packet);
            }
            Event::Timeout { generation } => {
                let timer = self.sender.timer_mut();
                if generation != timer.generation() || !timer.is_armed() {
                    return;
                }
                timer.fire();
                self.sender.on_timeout();
            }
        }
    }

    /// Move everything the entities produced onto the channel and the clock.
    fn flush(&mut self) {
        while self.sender.can_submit() {
            let Some(message) = self.backlog.pop_front() else {
                break;
            };
            if let SubmitOutcome::Sent { .. } = self.sender.submit(message) {
                self.accepted.push(message);
            }
        }

        let to_b: Vec<Packet> = self.sender.channel_mut().drain().collect();
        for packet in to_b {
            self.transmit(Entity::B, packet);
        }
        let to_a: Vec<Packet> = self.receiver.channel_mut().drain().collect();
        for packet in to_a {
            self.transmit(Entity::A, packet);
        }

        let timer = self.sender.timer();
        if timer.generation() != self.timer_generation {
            self.timer_generation = timer.generation();
            if let Some(duration) = timer.armed() {
                let generation = self.timer_generation;
                self.schedule(duration, Event::Timeout { generation });
            }
        }
    }

    fn transmit(&mut self, to: Entity, mut packet: Packet) {
        match to {
            Entity::A => self.channel.to_a += 1,
            Entity::B => self.channel.to_b += 1,
        }

        if self.rng.gen::<f64>() < self.config.loss_rate {
            self.channel.lost += 1;
            log::debug!("[sim] lost packet to {to} (seq={} ack={})", packet.seq, packet.ack);
            return;
        }

        if self.rng.gen::<f64>() < self.config.corrupt_rate {
            self.channel.corrupted += 1;
            let pick = self.rng.gen::<f64>();
            if pick < 0.75 {
                packet.payload[0] = b'Z';
            } else if pick < 0.875 {
                packet.seq = CORRUPT_FIELD;
            } else {
                packet.ack = CORRUPT_FIELD;
            }
            log::debug!("[sim] corrupted packet to {to}");
        }

        let delay = self.random_between(self.config.min_delay, self.config.max_delay);
        let mut arrival = self.now + delay;
        let lane = match to {
            Entity::A => 0,
            Entity::B => 1,
        };
        if !self.config.reorder {
            arrival = arrival.max(self.last_arrival[lane]);
        }
        self.last_arrival[lane] = self.last_arrival[lane].max(arrival);
        self.schedule(arrival - self.now, Event::Arrive { to, packet });
    }

    fn schedule(&mut self, after: Duration, event: Event) {
        let order = self.next_order;
        self.next_order += 1;
        self.queue.push(Scheduled {
            at: self.now + after,
            order,
            event,
        });
    }

    fn next_gap(&mut self) -> Duration {
        self.random_between(Duration::ZERO, self.config.message_interval * 2)
    }

    fn random_between(&mut self, lo: Duration, hi: Duration) -> Duration {
        if lo >= hi {
            return lo;
        }
        let nanos = self.rng.gen_range(lo.as_nanos() as u64..=hi.as_nanos() as u64);
        Duration::from_nanos(nanos)
    }
}

/// The `i`-th generated message: twenty copies of one lowercase letter.
pub fn generated_message(i: usize) -> Message {
    [b'a' + (i % 26) as u8; PAYLOAD_LEN]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(sim: SimulatorConfig) -> SimReport {
        Simulation::new(SrConfig::default(), sim).unwrap().run()
    }

    #[test]
    fn perfect_channel_delivers_everything() {
        let report = run(SimulatorConfig {
            messages: 50,
            hold_when_full: true,
            ..Default::default()
        });
        assert!(report.completed);
        assert_eq!(report.accepted.len(), 50);
        assert!(report.delivered_in_order());
        assert_eq!(report.channel.lost, 0);
    }

    #[test]
    fn same_seed_replays_identically() {
        let cfg = SimulatorConfig {
            messages: 40,
            loss_rate: 0.2,
            corrupt_rate: 0.2,
            reorder: true,
            seed: 7,
            ..Default::default()
        };
        let a = run(cfg.clone());
        let b = run(cfg);
        assert_eq!(a.sender, b.sender);
        assert_eq!(a.receiver, b.receiver);
        assert_eq!(a.channel, b.channel);
        assert_eq!(a.elapsed, b.elapsed);
    }

    #[test]
    fn full_window_without_backlog_drops_messages() {
        // Messages arrive far faster than acks can return.
        let report = run(SimulatorConfig {
            messages: 30,
            message_interval: Duration::from_micros(10),
            min_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(5),
            ..Default::default()
        });
        assert!(report.messages_dropped > 0);
        assert_eq!(report.messages_dropped as u64, report.sender.window_full);
        assert_eq!(report.accepted.len() + report.messages_dropped, 30);
        assert!(report.delivered_in_order());
    }

    #[test]
    fn rejects_bad_probability() {
        let err = Simulation::new(
            SrConfig::default(),
            SimulatorConfig {
                loss_rate: 1.5,
                ..Default::default()
            },
        )
        .err();
        assert_eq!(
            err,
            Some(SimulatorError::BadProbability {
                name: "loss_rate",
                value: 1.5
            })
        );
    }

    #[test]
    fn rejects_inverted_delay_range() {
        let err = Simulation::new(
            SrConfig::default(),
            SimulatorConfig {
                min_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(1),
                ..Default::default()
            },
        )
        .err();
        assert!(matches!(err, Some(SimulatorError::BadDelayRange { .. })));
    }

    #[test]
    fn generated_messages_cycle_through_alphabet() {
        assert_eq!(generated_message(0), [b'a'; PAYLOAD_LEN]);
        assert_eq!(generated_message(25), [b'z'; PAYLOAD_LEN]);
        assert_eq!(generated_message(26), [b'a'; PAYLOAD_LEN]);
    }
}
