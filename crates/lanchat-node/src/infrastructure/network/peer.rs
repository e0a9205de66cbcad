//! Peer: the client role – one outbound connection to a hub.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ──connect + handshake──► Connected
//! Connected ──disconnect / EOF / read error / hub shutdown──► Disconnected
//! ```
//!
//! While Connected a single receive loop blocks on the connection and
//! forwards every chat line to the caller through the event channel. The
//! hub's shutdown notice is recognised by its decoded frame type – never by
//! comparing chat text – and triggers a local disconnect.
//!
//! A failed `send` is reported to the caller but does not itself force a
//! disconnect; the receive loop notices the broken connection on its next
//! read. A locally requested disconnect is expected, so the read error it
//! provokes is not reported as a fault.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use lanchat_core::{write_frame, Frame, FrameReader, TransportError};
use thiserror::Error;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Error type for the client role.
#[derive(Debug, Error)]
pub enum PeerError {
    /// The TCP connection to the hub could not be established. Reported
    /// synchronously; no role state is left behind.
    #[error("failed to connect to hub at {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A send was attempted while disconnected.
    #[error("not connected to a hub")]
    NotConnected,

    /// A frame could not be written to the hub.
    #[error("send failed: {0}")]
    Send(#[from] TransportError),
}

/// Lifecycle state of the client role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Connected,
    Disconnected,
}

/// Events delivered to the caller's display sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A chat line relayed by the hub.
    LineReceived(String),
    /// The hub announced it is stopping; the connection is going away.
    HubShutdown,
    /// The receive loop has ended; the peer is now Disconnected.
    Disconnected,
}

/// The client role: a live connection to one hub.
pub struct PeerConnection {
    addr: SocketAddr,
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    state: Arc<Mutex<PeerState>>,
    closing: Arc<AtomicBool>,
    local_close: Arc<Notify>,
    read_task: Mutex<Option<JoinHandle<()>>>,
}

impl PeerConnection {
    /// Connects to a hub, sends the handshake, and starts the receive loop.
    ///
    /// Returns the connection and the event stream for the display sink.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError::ConnectFailed`] when the hub is unreachable and
    /// [`PeerError::Send`] when the handshake cannot be written. In both
    /// cases nothing keeps running.
    pub async fn connect(
        addr: SocketAddr,
        name: &str,
    ) -> Result<(Self, mpsc::Receiver<PeerEvent>), PeerError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| PeerError::ConnectFailed { addr, source })?;
        let (read_half, mut write_half) = stream.into_split();

        write_frame(
            &mut write_half,
            &Frame::Hello {
                name: name.to_string(),
            },
        )
        .await?;
        info!("connected to hub at {addr} as {name}");

        let state = Arc::new(Mutex::new(PeerState::Connected));
        let closing = Arc::new(AtomicBool::new(false));
        let local_close = Arc::new(Notify::new());
        let (event_tx, event_rx) = mpsc::channel(64);

        let read_task = tokio::spawn(receive_loop(
            read_half,
            event_tx,
            Arc::clone(&state),
            Arc::clone(&closing),
            Arc::clone(&local_close),
        ));

        Ok((
            Self {
                addr,
                writer: Arc::new(tokio::sync::Mutex::new(write_half)),
                state,
                closing,
                local_close,
                read_task: Mutex::new(Some(read_task)),
            },
            event_rx,
        ))
    }

    /// The hub address this peer connected to.
    pub fn hub_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> PeerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sends one chat line to the hub.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError::NotConnected`] after a disconnect, and
    /// [`PeerError::Send`] when the write fails. A failed send leaves the
    /// connection up; the receive loop decides when it is truly gone.
    pub async fn send(&self, text: &str) -> Result<(), PeerError> {
        if self.state() != PeerState::Connected {
            return Err(PeerError::NotConnected);
        }
        let frame = Frame::Chat {
            text: text.to_string(),
        };
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &frame).await?;
        Ok(())
    }

    /// Disconnects from the hub and waits for the receive loop to finish.
    ///
    /// Idempotent: disconnecting an already-disconnected peer does nothing.
    pub async fn disconnect(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("disconnecting from hub at {}", self.addr);

        // Wake the receive loop, then half-close so the hub sees EOF.
        self.local_close.notify_one();
        {
            let mut writer = self.writer.lock().await;
            let _ = tokio::io::AsyncWriteExt::shutdown(&mut *writer).await;
        }

        let read_task = self
            .read_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = read_task {
            let _ = task.await;
        }
    }
}

/// The single receive loop for the client role.
async fn receive_loop(
    read_half: OwnedReadHalf,
    events: mpsc::Sender<PeerEvent>,
    state: Arc<Mutex<PeerState>>,
    closing: Arc<AtomicBool>,
    local_close: Arc<Notify>,
) {
    let mut reader = FrameReader::new(read_half);

    loop {
        tokio::select! {
            frame = reader.next_frame() => match frame {
                Ok(Some(Frame::Chat { text })) => {
                    if events.send(PeerEvent::LineReceived(text)).await.is_err() {
                        break;
                    }
                }
                Ok(Some(Frame::Shutdown)) => {
                    info!("hub is shutting down; disconnecting");
                    let _ = events.send(PeerEvent::HubShutdown).await;
                    break;
                }
                Ok(Some(Frame::Hello { .. })) => {
                    // The hub never sends a handshake; ignore it.
                    debug!("ignoring handshake frame from the hub");
                }
                Ok(None) => {
                    info!("hub closed the connection");
                    break;
                }
                Err(e) => {
                    if !closing.load(Ordering::SeqCst) {
                        warn!("connection to hub lost: {e}");
                    }
                    break;
                }
            },
            _ = local_close.notified() => break,
        }
    }

    *state.lock().unwrap_or_else(|e| e.into_inner()) = PeerState::Disconnected;
    let _ = events.send(PeerEvent::Disconnected).await;
}
