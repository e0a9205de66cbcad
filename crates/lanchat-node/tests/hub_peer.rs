//! Integration tests for the hub and peer roles over real loopback sockets.
//!
//! # Purpose
//!
//! These tests exercise the hub, the roster, the broadcaster, and the peer
//! role through their *public* API the same way the binary uses them:
//! ephemeral-port listeners, real TCP connections, and the event channels
//! as the only observation points. They verify:
//!
//! - Registry counts track connects and disconnects.
//! - Fan-out excludes the sender but reaches everyone else, in send order.
//! - The shutdown notice reaches every peer exactly once, and teardown is
//!   idempotent on both sides.
//! - A missing handshake degrades to the remote address as the display
//!   name instead of failing the connection.
//! - A chat message that spells the shutdown sentinel is still chat.
//!
//! Every wait goes through a bounded timeout so a regression shows up as a
//! clear failure rather than a hung test run.

use std::net::SocketAddr;
use std::time::Duration;

use lanchat_node::infrastructure::network::hub::{Hub, HubConfig, HubEvent, HubState};
use lanchat_node::infrastructure::network::peer::{PeerConnection, PeerError, PeerEvent, PeerState};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// Loopback hub on an ephemeral port, with a short handshake budget so
/// fallback paths stay fast.
fn test_hub_config() -> HubConfig {
    HubConfig {
        bind_address: "127.0.0.1".parse().unwrap(),
        port: 0,
        write_deadline: Duration::from_secs(2),
        handshake_timeout: Duration::from_millis(500),
    }
}

async fn start_hub() -> (Hub, mpsc::Receiver<HubEvent>) {
    Hub::start(test_hub_config())
        .await
        .expect("hub must bind on loopback")
}

async fn join(addr: SocketAddr, name: &str) -> (PeerConnection, mpsc::Receiver<PeerEvent>) {
    PeerConnection::connect(addr, name)
        .await
        .expect("peer must reach the loopback hub")
}

async fn next_hub_event(rx: &mut mpsc::Receiver<HubEvent>) -> HubEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a hub event")
        .expect("hub event stream ended unexpectedly")
}

async fn next_peer_event(rx: &mut mpsc::Receiver<PeerEvent>) -> PeerEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a peer event")
        .expect("peer event stream ended unexpectedly")
}

async fn next_line(rx: &mut mpsc::Receiver<PeerEvent>) -> String {
    match next_peer_event(rx).await {
        PeerEvent::LineReceived(line) => line,
        other => panic!("expected a chat line, got {other:?}"),
    }
}

/// Skips relayed chat until the shutdown notice arrives.
async fn expect_shutdown(rx: &mut mpsc::Receiver<PeerEvent>) {
    loop {
        match next_peer_event(rx).await {
            PeerEvent::HubShutdown => return,
            PeerEvent::LineReceived(_) => continue,
            PeerEvent::Disconnected => panic!("disconnected before the shutdown notice"),
        }
    }
}

/// Waits for the hub to report a join and returns the registered name.
async fn expect_joined(rx: &mut mpsc::Receiver<HubEvent>) -> String {
    loop {
        match next_hub_event(rx).await {
            HubEvent::PeerJoined { name, .. } => return name,
            HubEvent::MessageReceived { .. } => continue,
            other => panic!("expected a join, got {other:?}"),
        }
    }
}

// ── Registry lifecycle ────────────────────────────────────────────────────────

/// Registry counts rise with each connect and fall again as peers leave;
/// stopping the hub empties the roster entirely.
#[tokio::test]
async fn test_registry_counts_track_connects_and_disconnects() {
    let (hub, mut hub_events) = start_hub().await;
    assert_eq!(hub.state(), HubState::Listening);
    assert_eq!(hub.peer_count(), 0);

    let (_alice, _alice_events) = join(hub.local_addr(), "alice").await;
    assert_eq!(expect_joined(&mut hub_events).await, "alice");
    assert_eq!(hub.peer_count(), 1);

    let (bob, _bob_events) = join(hub.local_addr(), "bob").await;
    assert_eq!(expect_joined(&mut hub_events).await, "bob");
    assert_eq!(hub.peer_count(), 2);

    bob.disconnect().await;
    loop {
        match next_hub_event(&mut hub_events).await {
            HubEvent::PeerLeft { name } => {
                assert_eq!(name, "bob");
                break;
            }
            HubEvent::MessageReceived { .. } => continue,
            other => panic!("expected bob to leave, got {other:?}"),
        }
    }
    assert_eq!(hub.peer_count(), 1);

    hub.stop().await;
    assert_eq!(hub.state(), HubState::Stopped);
    assert_eq!(hub.peer_count(), 0);
}

/// A join notice fans out to the peers already in the room, and only to
/// them – the newcomer never sees their own arrival.
#[tokio::test]
async fn test_join_notice_reaches_existing_peers_only() {
    let (hub, mut hub_events) = start_hub().await;

    let (_alice, mut alice_events) = join(hub.local_addr(), "alice").await;
    expect_joined(&mut hub_events).await;

    let (_bob, mut bob_events) = join(hub.local_addr(), "bob").await;
    expect_joined(&mut hub_events).await;

    assert_eq!(next_line(&mut alice_events).await, "bob joined the chat");

    // If bob had been sent his own join notice it would arrive before this
    // marker; per-destination FIFO makes the check deterministic.
    hub.send("marker").await.unwrap();
    assert_eq!(next_line(&mut bob_events).await, "marker");

    hub.stop().await;
}

// ── Fan-out semantics ─────────────────────────────────────────────────────────

/// A message from one peer reaches every other peer in send order, and is
/// never echoed back to its sender.
#[tokio::test]
async fn test_chat_fans_out_in_order_and_skips_the_sender() {
    let (hub, mut hub_events) = start_hub().await;

    let (alice, mut alice_events) = join(hub.local_addr(), "alice").await;
    expect_joined(&mut hub_events).await;
    let (bob, mut bob_events) = join(hub.local_addr(), "bob").await;
    expect_joined(&mut hub_events).await;

    // alice's view of the room so far: bob arriving.
    assert_eq!(next_line(&mut alice_events).await, "bob joined the chat");

    alice.send("alice: m1").await.unwrap();
    alice.send("alice: m2").await.unwrap();

    // FIFO from one origin: m1 strictly before m2.
    assert_eq!(next_line(&mut bob_events).await, "alice: m1");
    assert_eq!(next_line(&mut bob_events).await, "alice: m2");

    // alice must not have received her own lines: the very next thing she
    // sees is bob's reply.
    bob.send("bob: reply").await.unwrap();
    assert_eq!(next_line(&mut alice_events).await, "bob: reply");

    hub.stop().await;
}

/// An operator line from the hub itself reaches every connected peer.
#[tokio::test]
async fn test_hub_operator_line_reaches_every_peer() {
    let (hub, mut hub_events) = start_hub().await;

    let (_alice, mut alice_events) = join(hub.local_addr(), "alice").await;
    expect_joined(&mut hub_events).await;
    let (_bob, mut bob_events) = join(hub.local_addr(), "bob").await;
    expect_joined(&mut hub_events).await;

    // Drain alice's view of bob arriving first.
    assert_eq!(next_line(&mut alice_events).await, "bob joined the chat");

    hub.send("hub: welcome, everyone").await.unwrap();
    assert_eq!(next_line(&mut alice_events).await, "hub: welcome, everyone");
    assert_eq!(next_line(&mut bob_events).await, "hub: welcome, everyone");

    hub.stop().await;
}

/// The relay delivers chat verbatim – including text that spells the
/// shutdown sentinel, which must arrive as chat and leave the receiving
/// peer connected.
#[tokio::test]
async fn test_chat_spelling_the_shutdown_sentinel_stays_chat() {
    let (hub, mut hub_events) = start_hub().await;

    let (alice, _alice_events) = join(hub.local_addr(), "alice").await;
    expect_joined(&mut hub_events).await;
    let (bob, mut bob_events) = join(hub.local_addr(), "bob").await;
    expect_joined(&mut hub_events).await;

    alice.send("[HUB_DOWN]").await.unwrap();

    assert_eq!(next_line(&mut bob_events).await, "[HUB_DOWN]");
    assert_eq!(bob.state(), PeerState::Connected);

    hub.stop().await;
}

// ── Shutdown and teardown ─────────────────────────────────────────────────────

/// Every connected peer hears the shutdown notice exactly once, then
/// observes the disconnect; a second stop is a silent no-op.
#[tokio::test]
async fn test_stop_notifies_every_peer_once_and_is_idempotent() {
    let (hub, mut hub_events) = start_hub().await;

    let mut peers = Vec::new();
    for name in ["alice", "bob", "carol"] {
        let (peer, events) = join(hub.local_addr(), name).await;
        expect_joined(&mut hub_events).await;
        peers.push((peer, events));
    }
    assert_eq!(hub.peer_count(), 3);

    hub.stop().await;
    hub.stop().await;
    assert_eq!(hub.state(), HubState::Stopped);

    for (peer, mut events) in peers {
        expect_shutdown(&mut events).await;
        // Exactly once: the next event is the disconnect, not a second
        // notice.
        assert_eq!(next_peer_event(&mut events).await, PeerEvent::Disconnected);
        assert_eq!(peer.state(), PeerState::Disconnected);
    }
}

/// Disconnecting twice, then sending, neither crashes nor resurrects the
/// connection.
#[tokio::test]
async fn test_peer_double_disconnect_is_harmless() {
    let (hub, mut hub_events) = start_hub().await;
    let (alice, mut alice_events) = join(hub.local_addr(), "alice").await;
    expect_joined(&mut hub_events).await;

    alice.disconnect().await;
    alice.disconnect().await;
    assert_eq!(alice.state(), PeerState::Disconnected);

    // The local close is expected, so the loop ends with a plain
    // Disconnected event, never a shutdown notice.
    assert_eq!(next_peer_event(&mut alice_events).await, PeerEvent::Disconnected);

    let result = alice.send("anyone there?").await;
    assert!(matches!(result, Err(PeerError::NotConnected)));

    hub.stop().await;
}

// ── Handshake edge cases ──────────────────────────────────────────────────────

/// A connection whose first line is not a handshake is still admitted: the
/// line is consumed and the remote address becomes the display name.
#[tokio::test]
async fn test_missing_handshake_falls_back_to_remote_address() {
    let (hub, mut hub_events) = start_hub().await;

    let (_alice, mut alice_events) = join(hub.local_addr(), "alice").await;
    expect_joined(&mut hub_events).await;

    // A raw client that never sends [NEW_USER].
    let mut raw = tokio::net::TcpStream::connect(hub.local_addr()).await.unwrap();
    let raw_addr = raw.local_addr().unwrap();
    raw.write_all(b"not a handshake\n").await.unwrap();

    assert_eq!(expect_joined(&mut hub_events).await, raw_addr.to_string());
    assert_eq!(
        next_line(&mut alice_events).await,
        format!("{raw_addr} joined the chat")
    );

    // The connection is fully functional afterwards.
    raw.write_all(b"still chatting\n").await.unwrap();
    assert_eq!(next_line(&mut alice_events).await, "still chatting");

    hub.stop().await;
}

/// A peer that vanishes without any goodbye (dropped socket) is reaped on
/// EOF and announced as having left.
#[tokio::test]
async fn test_dropped_connection_is_reaped_and_announced() {
    let (hub, mut hub_events) = start_hub().await;

    let (_alice, mut alice_events) = join(hub.local_addr(), "alice").await;
    expect_joined(&mut hub_events).await;
    let (bob, _bob_events) = join(hub.local_addr(), "bob").await;
    expect_joined(&mut hub_events).await;
    assert_eq!(next_line(&mut alice_events).await, "bob joined the chat");
    assert_eq!(hub.peer_count(), 2);

    // Tear bob down without a disconnect call.
    drop(bob);

    assert_eq!(next_line(&mut alice_events).await, "bob left the chat");
    assert_eq!(hub.peer_count(), 1);

    hub.stop().await;
}
