//! Selective Repeat over UDP: background event loops for each entity.
//!
//! # Architecture
//!
//! ```text
//!  Application                                       Application
//!      │ send(msg)                                        ▲ recv()
//!      ▼                                                  │
//!  SenderSession ── mpsc ──▶ sender_loop      receiver_loop ── mpsc ──▶ ReceiverSession
//!                              ├── SrSender                ├── SrReceiver
//!                              └── Socket ──── DATA ─────▶ └── Socket
//!                                         ◀─── ACK ──────
//! ```
//!
//! Each entity runs inside one spawned task, so the state machine still sees
//! exactly one event at a time.  The sender loop multiplexes three sources
//! with `tokio::select!`:
//!
//! 1. new messages from the application, polled **only while the window has
//!    room**, so a full window applies backpressure instead of rejecting;
//! 2. inbound acknowledgements from the socket;
//! 3. the retransmission timer, armed and disarmed through [`TimerState`].
//!
//! ```ignore
//! let sender = SenderSession::spawn(socket, peer, SrConfig::default());
//! sender.send(*b"twenty bytes exactly").await?;
//! let stats = sender.finish().await?;
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channel::{Application, Outbox};
use crate::config::SrConfig;
use crate::packet::{Message, Packet};
use crate::socket::{Socket, SocketError};
use crate::sr_receiver::{ReceiverStats, SrReceiver};
use crate::sr_sender::{SenderStats, SrSender};
use crate::timer::TimerState;

/// Capacity of the application ↔ loop channels.
const QUEUE_DEPTH: usize = 64;

/// Errors surfaced by the session handles.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error("session loop has already stopped")]
    Closed,
    #[error("session task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

// ---------------------------------------------------------------------------
// Sender side
// ---------------------------------------------------------------------------

/// Handle to a running sender loop.
pub struct SenderSession {
    send_tx: mpsc::Sender<Message>,
    handle: JoinHandle<Result<SenderStats, SessionError>>,
}

impl SenderSession {
    /// Spawn a sender loop transmitting to `peer` over `socket`.
    pub fn spawn(socket: Socket, peer: SocketAddr, config: SrConfig) -> Self {
        let (send_tx, send_rx) = mpsc::channel(QUEUE_DEPTH);
        let handle = tokio::spawn(sender_loop(socket, peer, config, send_rx));
        Self { send_tx, handle }
    }

    /// Queue one message; waits while the queue is full.
    pub async fn send(&self, message: Message) -> Result<(), SessionError> {
        self.send_tx
            .send(message)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Signal end-of-stream and wait until every queued message has been
    /// acknowledged.
    pub async fn finish(self) -> Result<SenderStats, SessionError> {
        drop(self.send_tx);
        self.handle.await?
    }
}

async fn sender_loop(
    socket: Socket,
    peer: SocketAddr,
    config: SrConfig,
    mut app_rx: mpsc::Receiver<Message>,
) -> Result<SenderStats, SessionError> {
    let mut sender = SrSender::new(config, Outbox::new(), TimerState::new());
    let mut app_open = true;
    let mut seen_generation = sender.timer().generation();

    // Parked far in the future whenever the protocol timer is stopped; the
    // `is_armed` guard keeps select! from acting on it.
    let far_future = Duration::from_secs(365 * 24 * 3600);
    let timer = tokio::time::sleep(far_future);
    tokio::pin!(timer);

    log::info!("[sr:A] sending from {} to {peer}", socket.local_addr);

    while app_open || sender.in_flight() > 0 {
        tokio::select! {
            maybe_msg = app_rx.recv(), if app_open && sender.can_submit() => {
                match maybe_msg {
                    Some(message) => {
                        let _ = sender.submit(message);
                    }
                    None => {
                        log::debug!("[sr:A] application closed; draining {} packet(s)", sender.in_flight());
                        app_open = false;
                    }
                }
            }

            result = socket.recv_from() => {
                match result {
                    Ok((packet, addr)) if addr == peer => {
                        sender.on_ack(&packet);
                    }
                    Ok((_, addr)) => {
                        log::warn!("[sr:A] ignoring datagram from unexpected {addr}");
                    }
                    Err(e) if e.is_transient() => {
                        log::warn!("[sr:A] dropped datagram: {e}");
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            _ = &mut timer, if sender.timer().is_armed() => {
                sender.timer_mut().fire();
                sender.on_timeout();
            }
        }

        let outbound: Vec<Packet> = sender.channel_mut().drain().collect();
        for packet in &outbound {
            socket.send_to(packet, peer).await?;
        }

        let state = sender.timer();
        if state.generation() != seen_generation {
            seen_generation = state.generation();
            let deadline = state.armed().unwrap_or(far_future);
            timer.as_mut().reset(tokio::time::Instant::now() + deadline);
        }
    }

    log::info!("[sr:A] all messages acknowledged");
    Ok(*sender.stats())
}

// ---------------------------------------------------------------------------
// Receiver side
// ---------------------------------------------------------------------------

/// Handle to a running receiver loop.
pub struct ReceiverSession {
    recv_rx: mpsc::Receiver<Message>,
    handle: JoinHandle<Result<ReceiverStats, SessionError>>,
}

impl ReceiverSession {
    /// Spawn a receiver loop answering whoever sends to `socket`.
    pub fn spawn(socket: Socket, config: SrConfig) -> Self {
        let (recv_tx, recv_rx) = mpsc::channel(QUEUE_DEPTH);
        let handle = tokio::spawn(receiver_loop(socket, config, recv_tx));
        Self { recv_rx, handle }
    }

    /// Next in-order message, or `None` once the loop has stopped.
    pub async fn recv(&mut self) -> Option<Message> {
        self.recv_rx.recv().await
    }

    /// Stop the loop and return its statistics.
    pub async fn close(self) -> Result<ReceiverStats, SessionError> {
        drop(self.recv_rx);
        self.handle.await?
    }
}

/// Payloads delivered during the current event, handed off right after it.
#[derive(Debug, Default)]
struct Handoff(Vec<Message>);

impl Application for Handoff {
    fn deliver(&mut self, payload: &Message) {
        self.0.push(*payload);
    }
}

async fn receiver_loop(
    socket: Socket,
    config: SrConfig,
    app_tx: mpsc::Sender<Message>,
) -> Result<ReceiverStats, SessionError> {
    let mut receiver = SrReceiver::new(config, Outbox::new(), Handoff::default());
    log::info!("[sr:B] receiving on {}", socket.local_addr);

    loop {
        let (packet, addr) = tokio::select! {
            _ = app_tx.closed() => break,
            result = socket.recv_from() => match result {
                Ok(v) => v,
                Err(e) if e.is_transient() => {
                    log::warn!("[sr:B] dropped datagram: {e}");
                    continue;
                }
                Err(e) => return Err(e.into()),
            },
        };

        receiver.on_packet(&packet);

        let acks: Vec<Packet> = receiver.channel_mut().drain().collect();
        for ack in &acks {
            socket.send_to(ack, addr).await?;
        }

        let delivered = std::mem::take(&mut receiver.app_mut().0);
        for message in delivered {
            if app_tx.send(message).await.is_err() {
                return Ok(*receiver.stats());
            }
        }
    }

    Ok(*receiver.stats())
}
