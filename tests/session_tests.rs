//! Integration tests for the UDP session layer.
//!
//! Each test spins up a sender and a receiver loop talking over the loopback
//! interface.  Both loops run as separate tokio tasks so they make progress
//! concurrently.

use std::net::SocketAddr;
use std::time::Duration;

use selective_repeat::session::{ReceiverSession, SenderSession};
use selective_repeat::socket::Socket;
use selective_repeat::{Message, Packet, SrConfig, PAYLOAD_LEN};

/// Bind a socket to an OS-assigned port on loopback.
async fn ephemeral() -> Socket {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    Socket::bind(addr).await.expect("bind failed")
}

fn message(i: usize) -> Message {
    let mut m = [b'.'; PAYLOAD_LEN];
    let label = format!("msg-{i:04}");
    m[..label.len()].copy_from_slice(label.as_bytes());
    m
}

// ---------------------------------------------------------------------------
// Test 1: a stream larger than the window arrives complete and in order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_stream_over_loopback() {
    const MSG_COUNT: usize = 40;
    let config = SrConfig::new(6, 12, Duration::from_millis(50)).unwrap();

    let recv_sock = ephemeral().await;
    let recv_addr = recv_sock.local_addr;
    let mut receiver = ReceiverSession::spawn(recv_sock, config);

    let sender = SenderSession::spawn(ephemeral().await, recv_addr, config);
    let producer = tokio::spawn(async move {
        for i in 0..MSG_COUNT {
            sender.send(message(i)).await.expect("send");
        }
        sender.finish().await.expect("finish")
    });

    let mut got = Vec::new();
    while got.len() < MSG_COUNT {
        let m = tokio::time::timeout(Duration::from_secs(10), receiver.recv())
            .await
            .expect("receiver stalled")
            .expect("receiver loop ended");
        got.push(m);
    }

    let sent_stats = producer.await.unwrap();
    assert_eq!(sent_stats.messages_sent, MSG_COUNT as u64);
    assert_eq!(sent_stats.window_full, 0, "session applies backpressure instead");

    for (i, m) in got.iter().enumerate() {
        assert_eq!(m, &message(i), "message {i} out of order");
    }

    let recv_stats = receiver.close().await.unwrap();
    assert_eq!(recv_stats.delivered, MSG_COUNT as u64);
}

// ---------------------------------------------------------------------------
// Test 2: retransmission recovers from a late-starting receiver
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_retransmits_until_receiver_appears() {
    let config = SrConfig::new(4, 8, Duration::from_millis(20)).unwrap();

    // Reserve an address, but do not answer on it yet.
    let recv_sock = ephemeral().await;
    let recv_addr = recv_sock.local_addr;

    let sender = SenderSession::spawn(ephemeral().await, recv_addr, config);
    for i in 0..3 {
        sender.send(message(i)).await.unwrap();
    }

    // Swallow the first transmissions so only retransmissions get through.
    let mut swallowed = 0;
    while swallowed < 3 {
        let (p, _) = recv_sock.recv_from().await.unwrap();
        assert!(!p.is_corrupted());
        swallowed += 1;
    }

    let mut receiver = ReceiverSession::spawn(recv_sock, config);
    for i in 0..3 {
        let m = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
            .await
            .expect("no retransmission arrived")
            .unwrap();
        assert_eq!(m, message(i));
    }

    let stats = sender.finish().await.unwrap();
    assert!(stats.packets_resent >= 3);
    receiver.close().await.unwrap();
}

// ---------------------------------------------------------------------------
// Test 3: corrupted datagrams are re-acked, never delivered
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_receiver_reacks_corrupted_datagram() {
    let config = SrConfig::default();
    let recv_sock = ephemeral().await;
    let recv_addr = recv_sock.local_addr;
    let mut receiver = ReceiverSession::spawn(recv_sock, config);

    let probe = ephemeral().await;
    let mut bad = Packet::data(0, message(0));
    bad.payload[0] = b'Z';
    probe.send_to(&bad, recv_addr).await.unwrap();

    let (ack, _) = tokio::time::timeout(Duration::from_secs(5), probe.recv_from())
        .await
        .expect("no ack")
        .unwrap();
    assert!(!ack.is_corrupted());
    assert_eq!(ack.ack, 11, "corrupted packet re-acks expected - 1");

    probe.send_to(&Packet::data(0, message(0)), recv_addr).await.unwrap();
    let (ack, _) = probe.recv_from().await.unwrap();
    assert_eq!(ack.ack, 0);
    assert_eq!(receiver.recv().await, Some(message(0)));

    let stats = receiver.close().await.unwrap();
    assert_eq!(stats.corrupted, 1);
    assert_eq!(stats.delivered, 1);
}
