//! `selective-repeat`: Selective Repeat ARQ for fixed-size messages.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐   DATA packets   ┌────────────┐
//!  │ SrSender │─────────────────▶│ SrReceiver │──▶ Application
//!  └────┬─────┘                  └─────┬──────┘
//!       │           ACKs               │
//!       │◀─────────────────────────────┘
//!       │
//!  TimerControl (one retransmission timer)
//! ```
//!
//! The two entities are pure state machines.  They reach the outside world
//! only through the collaborator traits in [`channel`] and [`timer`], so the
//! same code runs under the deterministic [`simulator`] and over real UDP via
//! [`session`].
//!
//! Each module has a single responsibility:
//! - [`packet`]    : packet layout, checksum engine, wire codec
//! - [`seq`]       : modular sequence-number arithmetic
//! - [`config`]    : validated window / sequence-space / timeout settings
//! - [`channel`]   : channel and application collaborator traits
//! - [`timer`]     : retransmission timer capability
//! - [`sr_sender`] : send-side window, selective acks, timeout resend
//! - [`sr_receiver`]: receive-side buffering and in-order delivery
//! - [`simulator`] : lossy/corrupting/reordering discrete-event harness
//! - [`socket`]    : async UDP socket abstraction
//! - [`session`]   : tokio event loops hosting each entity over UDP

pub mod channel;
pub mod config;
pub mod packet;
pub mod seq;
pub mod session;
pub mod simulator;
pub mod socket;
pub mod sr_receiver;
pub mod sr_sender;
pub mod timer;

pub use channel::{Application, Channel, Entity};
pub use config::{ConfigError, SrConfig};
pub use packet::{Message, Packet, NOT_IN_USE, PAYLOAD_LEN};
pub use sr_receiver::{RecvOutcome, SrReceiver};
pub use sr_sender::{AckOutcome, SrSender, SubmitOutcome};
pub use timer::TimerControl;
