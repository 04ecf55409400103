//! Collaborator interfaces the protocol entities call out to.
//!
//! The entities never perform I/O themselves.  Outbound packets go to a
//! [`Channel`], in-order payloads go to an [`Application`].  Both are injected
//! at construction, so a test can plug in recording doubles and a driver can
//! plug in buffers it drains after each event.

use std::collections::VecDeque;
use std::fmt;

use crate::packet::{Message, Packet};

/// Which side of the simplex transfer an entity plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    /// The data sender.
    A,
    /// The data receiver, which only ever emits acknowledgements.
    B,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}

/// The unreliable network below an entity.
pub trait Channel {
    /// Hand `packet` over for eventual (or no) delivery to the peer.
    fn send(&mut self, packet: Packet);
}

/// The application layer above the receiver.
pub trait Application {
    /// Accept the next payload of the in-order stream.
    fn deliver(&mut self, payload: &Message);
}

/// A [`Channel`] that queues packets until the driver drains them.
#[derive(Debug, Default, Clone)]
pub struct Outbox {
    queue: VecDeque<Packet>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Remove and return every queued packet, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = Packet> + '_ {
        self.queue.drain(..)
    }
}

impl Channel for Outbox {
    fn send(&mut self, packet: Packet) {
        self.queue.push_back(packet);
    }
}

/// An [`Application`] that collects delivered payloads in order.
#[derive(Debug, Default, Clone)]
pub struct Inbox {
    delivered: Vec<Message>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every payload delivered so far.
    pub fn delivered(&self) -> &[Message] {
        &self.delivered
    }
}

impl Application for Inbox {
    fn deliver(&mut self, payload: &Message) {
        self.delivered.push(*payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PAYLOAD_LEN;

    #[test]
    fn outbox_drains_in_send_order() {
        let mut out = Outbox::new();
        out.send(Packet::data(0, [b'a'; PAYLOAD_LEN]));
        out.send(Packet::data(1, [b'b'; PAYLOAD_LEN]));
        assert_eq!(out.len(), 2);

        let seqs: Vec<i32> = out.drain().map(|p| p.seq).collect();
        assert_eq!(seqs, vec![0, 1]);
        assert!(out.is_empty());
    }

    #[test]
    fn inbox_keeps_delivery_order() {
        let mut inbox = Inbox::new();
        inbox.deliver(&[1; PAYLOAD_LEN]);
        inbox.deliver(&[2; PAYLOAD_LEN]);
        assert_eq!(inbox.delivered(), &[[1; PAYLOAD_LEN], [2; PAYLOAD_LEN]]);
    }

    #[test]
    fn entity_displays_as_letter() {
        assert_eq!(Entity::A.to_string(), "A");
        assert_eq!(format!("[sr:{}]", Entity::B), "[sr:B]");
    }
}
