//! Entry point for the `sr` binary.
//!
//! Parses CLI arguments and dispatches into **simulate**, **send** or
//! **receive** mode.  All protocol work is delegated to library modules;
//! `main.rs` owns only process setup (logging, argument parsing, stdin/stdout).

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::AsyncReadExt;

use selective_repeat::session::{ReceiverSession, SenderSession};
use selective_repeat::simulator::{SimulatorConfig, Simulation};
use selective_repeat::socket::Socket;
use selective_repeat::{Message, SrConfig, PAYLOAD_LEN};

/// Selective Repeat ARQ over a simulated or real (UDP) channel.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Args)]
struct ProtocolArgs {
    /// Maximum number of unacknowledged packets.
    #[arg(short, long, default_value_t = 6)]
    window: usize,
    /// Size of the sequence-number space (at least twice the window).
    #[arg(short = 'S', long, default_value_t = 12)]
    seq_space: usize,
    /// Retransmission timeout in milliseconds.
    #[arg(short, long, default_value_t = 16)]
    timeout_ms: u64,
}

impl ProtocolArgs {
    fn config(&self) -> Result<SrConfig> {
        SrConfig::new(self.window, self.seq_space, Duration::from_millis(self.timeout_ms))
            .context("invalid protocol parameters")
    }
}

#[derive(Subcommand)]
enum Mode {
    /// Run a deterministic simulation and print its statistics.
    Simulate {
        #[command(flatten)]
        protocol: ProtocolArgs,
        /// Number of messages to generate.
        #[arg(short, long, default_value_t = 20)]
        messages: usize,
        /// Packet loss probability.
        #[arg(long, default_value_t = 0.0)]
        loss: f64,
        /// Packet corruption probability.
        #[arg(long, default_value_t = 0.0)]
        corrupt: f64,
        /// Mean time between messages, in milliseconds.
        #[arg(long, default_value_t = 10)]
        interval_ms: u64,
        /// Let packets overtake each other on the channel.
        #[arg(long)]
        reorder: bool,
        /// Retry messages rejected by a full window instead of dropping them.
        #[arg(long)]
        hold: bool,
        /// RNG seed.
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Send stdin to a receiver, twenty bytes per message.
    Send {
        #[command(flatten)]
        protocol: ProtocolArgs,
        /// Receiver address (e.g. 127.0.0.1:9000).
        #[arg(short, long)]
        peer: SocketAddr,
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,
    },
    /// Receive messages and print them to stdout.
    Receive {
        #[command(flatten)]
        protocol: ProtocolArgs,
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
        /// Exit after this many messages.
        #[arg(short, long)]
        count: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Simulate {
            protocol,
            messages,
            loss,
            corrupt,
            interval_ms,
            reorder,
            hold,
            seed,
        } => {
            let sim = SimulatorConfig {
                messages,
                message_interval: Duration::from_millis(interval_ms),
                loss_rate: loss,
                corrupt_rate: corrupt,
                reorder,
                hold_when_full: hold,
                seed,
                ..Default::default()
            };
            let report = Simulation::new(protocol.config()?, sim)
                .context("invalid simulator parameters")?
                .run();
            println!("{report}");
        }
        Mode::Send {
            protocol,
            peer,
            bind,
        } => {
            let config = protocol.config()?;
            let socket = Socket::bind(bind).await.context("bind failed")?;

            let mut input = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut input)
                .await
                .context("reading stdin")?;

            let session = SenderSession::spawn(socket, peer, config);
            for chunk in input.chunks(PAYLOAD_LEN) {
                let mut message: Message = [0; PAYLOAD_LEN];
                message[..chunk.len()].copy_from_slice(chunk);
                session.send(message).await?;
            }
            let stats = session.finish().await?;
            log::info!(
                "sent {} message(s), {} resent, {} window-full wait(s)",
                stats.messages_sent,
                stats.packets_resent,
                stats.window_full
            );
        }
        Mode::Receive {
            protocol,
            bind,
            count,
        } => {
            let config = protocol.config()?;
            let socket = Socket::bind(bind).await.context("bind failed")?;
            let mut session = ReceiverSession::spawn(socket, config);

            let mut received = 0usize;
            while count.map_or(true, |n| received < n) {
                tokio::select! {
                    maybe = session.recv() => match maybe {
                        Some(message) => {
                            let end = message.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
                            print!("{}", String::from_utf8_lossy(&message[..end]));
                            received += 1;
                        }
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            println!();

            let stats = session.close().await?;
            log::info!(
                "delivered {} message(s), {} duplicate(s), {} corrupted",
                stats.delivered,
                stats.duplicates,
                stats.corrupted
            );
        }
    }

    Ok(())
}
