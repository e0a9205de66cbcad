//! Roster: the hub's registry of connected peers.
//!
//! The `Roster` is the only piece of state shared between the accept loop,
//! every connection handler, and the broadcaster, so all access goes through
//! one mutex. Peer counts on a LAN are small; critical sections are limited
//! to a map insert, remove, or clone-out, and `snapshot` hands back a
//! point-in-time copy so fan-out iteration never races with registration.
//!
//! Invariant: a peer appears in the roster exactly while its connection
//! handler is looping and has not observed a disconnect. The handler
//! registers after the handshake resolves and unregisters on the way out;
//! the broadcaster may unregister earlier when a write to the peer fails.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use lanchat_core::{write_frame, Frame, TransportError};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Notify;
use uuid::Uuid;

/// Stable identifier for one registered peer connection.
pub type PeerId = Uuid;

/// Error type for roster operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RosterError {
    /// The hub is draining; no further registrations are accepted.
    #[error("roster is sealed; the hub is shutting down")]
    Sealed,
}

/// One connected remote peer, as seen from the hub.
///
/// The write half lives behind its own async mutex so the connection has a
/// single writer at a time and lines are never interleaved. The handle is
/// cheap to clone: snapshots clone it freely.
#[derive(Clone)]
pub struct PeerHandle {
    id: PeerId,
    name: String,
    addr: SocketAddr,
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    alive: Arc<AtomicBool>,
    closed: Arc<Notify>,
}

impl PeerHandle {
    pub fn new(id: PeerId, name: String, addr: SocketAddr, writer: OwnedWriteHalf) -> Self {
        Self {
            id,
            name,
            addr,
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
            alive: Arc::new(AtomicBool::new(true)),
            closed: Arc::new(Notify::new()),
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Writes one frame to this peer's connection.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the encode or the write fails. The
    /// caller decides whether that is terminal for the peer.
    pub async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, frame).await
    }

    /// Marks the peer dead and wakes its connection handler.
    ///
    /// Idempotent. The handler observes the wake-up, leaves its read loop,
    /// and finishes teardown itself; this is the race-free way to unpark a
    /// task blocked on a read.
    pub fn close(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            self.closed.notify_one();
        }
    }

    /// Resolves when [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.closed.notified().await;
    }

    /// Half-closes the connection so the remote side observes EOF.
    ///
    /// Called by the connection handler on its way out; errors are ignored
    /// because the socket may already be gone.
    pub async fn shutdown_writer(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

impl std::fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("addr", &self.addr)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// In-memory registry of the peers currently connected to the hub.
#[derive(Default)]
pub struct Roster {
    peers: Mutex<HashMap<PeerId, PeerHandle>>,
    sealed: AtomicBool,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PeerId, PeerHandle>> {
        // A poisoned lock only means another thread panicked mid-operation;
        // the map itself is still structurally sound.
        self.peers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds a peer to the roster.
    ///
    /// # Errors
    ///
    /// Returns [`RosterError::Sealed`] once [`seal`](Self::seal) has been
    /// called, so connections accepted in the instant before shutdown cannot
    /// slip in behind the drain.
    pub fn register(&self, peer: PeerHandle) -> Result<(), RosterError> {
        let mut peers = self.lock();
        if self.sealed.load(Ordering::SeqCst) {
            return Err(RosterError::Sealed);
        }
        peers.insert(peer.id(), peer);
        Ok(())
    }

    /// Removes a peer, returning its handle if it was still registered.
    pub fn unregister(&self, id: PeerId) -> Option<PeerHandle> {
        self.lock().remove(&id)
    }

    /// Returns a point-in-time copy of every registered peer.
    ///
    /// A peer that disconnects right after the snapshot may still appear in
    /// it; writes to it simply fail and the broadcaster reaps it.
    pub fn snapshot(&self) -> Vec<PeerHandle> {
        self.lock().values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Refuses all future registrations. Called once when the hub drains.
    pub fn seal(&self) {
        let _peers = self.lock();
        self.sealed.store(true, Ordering::SeqCst);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
