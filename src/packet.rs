//! Packet layout, checksum engine and wire codec.
//!
//! Every datagram exchanged between the two entities is a [`Packet`]: data
//! packets flow from the sender to the receiver, acknowledgement packets flow
//! back.  Both directions share the same fixed layout.
//!
//! # Checksum
//!
//! The integrity code is the plain integer sum
//! `seq + ack + Σ payload[i]` (wrapping).  It is an error-detection code, not
//! a cryptographic one: altering any *single* field without recomputing the
//! checksum is always detected, while a packet whose fields and checksum were
//! rewritten consistently is indistinguishable from a valid one.
//!
//! # Wire format
//!
//! All integers are **big-endian** two's-complement.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           Checksum                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Payload (20 bytes) ...                    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Decoding validates only the datagram length.  The checksum is left for the
//! protocol layer to judge with [`is_corrupted`], so a corrupted datagram still
//! reaches the entity and triggers the usual recovery path.

use thiserror::Error;

/// Width of every payload in bytes.
pub const PAYLOAD_LEN: usize = 20;

/// Byte length of an encoded packet.
pub const WIRE_LEN: usize = 12 + PAYLOAD_LEN;

/// Filler for header fields that carry no meaning, e.g. the ack number of a
/// data packet.  Never a valid sequence number.
pub const NOT_IN_USE: i32 = -1;

const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 4;
const OFF_CHECKSUM: usize = 8;
const OFF_PAYLOAD: usize = 12;

/// An application-layer message: exactly [`PAYLOAD_LEN`] opaque bytes.
pub type Message = [u8; PAYLOAD_LEN];

/// A protocol datagram.
///
/// Fields are public so a channel simulator can tamper with a copy in flight;
/// the protocol itself never mutates a packet after building it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    /// Sequence number of a data packet, or the response counter of an ack.
    pub seq: i32,
    /// Acknowledged sequence number, or [`NOT_IN_USE`] on data packets.
    pub ack: i32,
    /// Value of [`compute_checksum`] at construction time.
    pub checksum: i32,
    pub payload: Message,
}

impl Packet {
    /// Build a packet and stamp it with its checksum.
    pub fn new(seq: i32, ack: i32, payload: Message) -> Self {
        let mut packet = Self {
            seq,
            ack,
            checksum: 0,
            payload,
        };
        packet.checksum = compute_checksum(&packet);
        packet
    }

    /// Build a data packet carrying `message` under sequence number `seq`.
    pub fn data(seq: i32, message: Message) -> Self {
        Self::new(seq, NOT_IN_USE, message)
    }

    /// Shorthand for [`is_corrupted`].
    pub fn is_corrupted(&self) -> bool {
        is_corrupted(self)
    }

    /// Serialise into a fixed-size buffer.
    ///
    /// The stored checksum is written as-is, not recomputed.
    pub fn encode(&self) -> [u8; WIRE_LEN] {
        let mut buf = [0u8; WIRE_LEN];
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seq.to_be_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&self.ack.to_be_bytes());
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 4].copy_from_slice(&self.checksum.to_be_bytes());
        buf[OFF_PAYLOAD..].copy_from_slice(&self.payload);
        buf
    }

    /// Parse a packet from a raw datagram.
    ///
    /// Returns [`Err`] only when `buf` is not exactly [`WIRE_LEN`] bytes long.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() != WIRE_LEN {
            return Err(PacketError::BadLength {
                expected: WIRE_LEN,
                actual: buf.len(),
            });
        }

        let mut payload = [0u8; PAYLOAD_LEN];
        payload.copy_from_slice(&buf[OFF_PAYLOAD..]);

        Ok(Self {
            seq: read_i32(buf, OFF_SEQ),
            ack: read_i32(buf, OFF_ACK),
            checksum: read_i32(buf, OFF_CHECKSUM),
            payload,
        })
    }
}

fn read_i32(buf: &[u8], off: usize) -> i32 {
    i32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("datagram is {actual} bytes, expected {expected}")]
    BadLength { expected: usize, actual: usize },
}

/// Compute the integrity code of `packet` from its current field values.
///
/// The stored `checksum` field does not take part in the sum.
pub fn compute_checksum(packet: &Packet) -> i32 {
    packet
        .payload
        .iter()
        .fold(packet.seq.wrapping_add(packet.ack), |sum, &b| {
            sum.wrapping_add(i32::from(b))
        })
}

/// `true` when the stored checksum disagrees with the recomputed one.
pub fn is_corrupted(packet: &Packet) -> bool {
    packet.checksum != compute_checksum(packet)
}
