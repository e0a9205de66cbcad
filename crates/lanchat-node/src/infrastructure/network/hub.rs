//! Hub: the server role.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped ──start──► Listening ──stop──► Draining ──► Stopped
//! ```
//!
//! While Listening, the accept loop blocks on the listening socket and
//! spawns one connection handler task per accepted peer, returning to accept
//! immediately – no handshake or read ever runs on the accept task. Stop
//! wakes the accept loop, seals the roster, announces [`Frame::Shutdown`] to
//! every peer, closes each peer, and waits for all handler tasks to finish
//! before declaring Stopped. A second stop is a no-op.
//!
//! # Connection handler
//!
//! Each handler owns exactly one accepted connection:
//!
//! 1. Bounded handshake read. A missing, late, or malformed `[NEW_USER]`
//!    line falls back to the remote address as the display name – never an
//!    error.
//! 2. Join notice to the other peers, then registration.
//! 3. Chat loop: every inbound line fans out with the sender excluded (the
//!    sender's own UI echoes locally).
//! 4. On EOF, read error, or close: unregister, half-close, leave notice.
//!
//! An I/O failure on one handler's connection terminates only that handler.

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lanchat_core::{Frame, FrameReader, ProtocolError, DEFAULT_PORT};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::application::roster::{PeerHandle, PeerId, Roster};
use crate::infrastructure::network::broadcast::Broadcaster;

/// Error type for hub operations.
#[derive(Debug, Error)]
pub enum HubError {
    /// The listening socket could not be bound (address in use, permission).
    /// Reported to the caller and never retried automatically.
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration for the hub role.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Address to bind the listener to. `0.0.0.0` binds all interfaces.
    pub bind_address: IpAddr,
    /// TCP port to listen on. Port 0 picks an ephemeral port.
    pub port: u16,
    /// Per-destination write budget inside a fan-out.
    pub write_deadline: Duration,
    /// How long a new connection may take to present its handshake line.
    pub handshake_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".parse().unwrap(),
            port: DEFAULT_PORT,
            write_deadline: Duration::from_secs(2),
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

/// Lifecycle state of the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubState {
    Listening,
    Draining,
    Stopped,
}

/// Events emitted by the hub to the operator's display sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    PeerJoined { name: String, addr: SocketAddr },
    PeerLeft { name: String },
    MessageReceived { from: String, text: String },
    Stopped,
}

/// The running server role: listener plus all per-connection handlers.
pub struct Hub {
    local_addr: SocketAddr,
    roster: Arc<Roster>,
    broadcaster: Broadcaster,
    state: Arc<Mutex<HubState>>,
    shutdown: Arc<Notify>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl Hub {
    /// Binds the listener and starts accepting peers.
    ///
    /// Returns the running hub and the event stream for the display sink.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::BindFailed`] when the socket cannot be bound.
    pub async fn start(config: HubConfig) -> Result<(Self, mpsc::Receiver<HubEvent>), HubError> {
        let bind_addr = SocketAddr::new(config.bind_address, config.port);
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|source| HubError::BindFailed {
                addr: bind_addr,
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| HubError::BindFailed {
                addr: bind_addr,
                source,
            })?;

        let roster = Arc::new(Roster::new());
        let broadcaster = Broadcaster::new(Arc::clone(&roster), config.write_deadline);
        let shutdown = Arc::new(Notify::new());
        let (event_tx, event_rx) = mpsc::channel(64);

        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&roster),
            broadcaster.clone(),
            event_tx,
            Arc::clone(&shutdown),
            config.handshake_timeout,
        ));

        info!("hub listening on {local_addr}");
        Ok((
            Self {
                local_addr,
                roster,
                broadcaster,
                state: Arc::new(Mutex::new(HubState::Listening)),
                shutdown,
                accept_task: Mutex::new(Some(accept_task)),
            },
            event_rx,
        ))
    }

    /// The address the listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> HubState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of currently registered peers.
    pub fn peer_count(&self) -> usize {
        self.roster.count()
    }

    /// Sends an operator chat line to every connected peer.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::EmbeddedNewline`] for text that cannot form
    /// one line; the text is validated before any peer is written.
    pub async fn send(&self, text: &str) -> Result<(), ProtocolError> {
        let frame = Frame::Chat {
            text: text.to_string(),
        };
        frame.encode()?;
        self.broadcaster.deliver(None, &frame, false).await;
        Ok(())
    }

    /// Stops the hub: refuses new peers, announces shutdown, closes every
    /// connection, and waits for all handlers to finish.
    ///
    /// Idempotent – only the first call drains; later calls return once the
    /// state has left Listening, so the shutdown notice is sent exactly once.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != HubState::Listening {
                return;
            }
            *state = HubState::Draining;
        }
        info!("hub draining");

        // Wake the accept loop; it closes the listener on its way out.
        self.shutdown.notify_one();
        self.roster.seal();

        // Every peer – no origin to exclude – hears the shutdown notice
        // before its connection is closed.
        self.broadcaster.deliver(None, &Frame::Shutdown, false).await;
        for peer in self.roster.snapshot() {
            peer.close();
        }

        let accept_task = self
            .accept_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = accept_task {
            let _ = task.await;
        }

        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = HubState::Stopped;
        info!("hub stopped");
    }
}

/// Accept loop: admits connections until woken, then drains the handlers.
async fn accept_loop(
    listener: TcpListener,
    roster: Arc<Roster>,
    broadcaster: Broadcaster,
    events: mpsc::Sender<HubEvent>,
    shutdown: Arc<Notify>,
    handshake_timeout: Duration,
) {
    let mut handlers = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!("inbound connection from {addr}");
                    handlers.spawn(run_connection(
                        stream,
                        addr,
                        Arc::clone(&roster),
                        broadcaster.clone(),
                        events.clone(),
                        handshake_timeout,
                    ));
                }
                Err(e) => {
                    // Transient accept failures (e.g. fd exhaustion) do not
                    // bring the hub down.
                    warn!("accept failed: {e}");
                }
            },
            _ = shutdown.notified() => break,
            Some(result) = handlers.join_next(), if !handlers.is_empty() => {
                if let Err(e) = result {
                    warn!("connection handler aborted: {e}");
                }
            }
        }
    }

    // Closing the listener here is what unblocks any racing connect attempt
    // with a refusal instead of a hang.
    drop(listener);
    while handlers.join_next().await.is_some() {}
    let _ = events.send(HubEvent::Stopped).await;
}

/// Per-connection handler: handshake, join notice, chat loop, teardown.
async fn run_connection(
    stream: TcpStream,
    addr: SocketAddr,
    roster: Arc<Roster>,
    broadcaster: Broadcaster,
    events: mpsc::Sender<HubEvent>,
    handshake_timeout: Duration,
) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);

    // Bounded handshake attempt. Whatever arrives first is consumed: a
    // proper Hello names the peer, anything else falls back to the address.
    let name = match tokio::time::timeout(handshake_timeout, reader.next_frame()).await {
        Ok(Ok(Some(Frame::Hello { name }))) if !name.is_empty() => name,
        Ok(Ok(Some(_))) => addr.to_string(),
        Ok(Ok(None)) => {
            debug!("{addr} disconnected before the handshake");
            return;
        }
        Ok(Err(e)) => {
            debug!("handshake read from {addr} failed: {e}");
            addr.to_string()
        }
        Err(_) => addr.to_string(),
    };

    let handle = PeerHandle::new(PeerId::new_v4(), name.clone(), addr, write_half);

    // The join notice fans out before registration, so it reaches every
    // peer except the one joining.
    broadcaster
        .deliver(
            Some(handle.id()),
            &Frame::Chat {
                text: format!("{name} joined the chat"),
            },
            false,
        )
        .await;

    if roster.register(handle.clone()).is_err() {
        // The hub began draining while this connection was in its handshake.
        handle.shutdown_writer().await;
        return;
    }
    info!(%name, %addr, "peer registered");
    let _ = events
        .send(HubEvent::PeerJoined {
            name: name.clone(),
            addr,
        })
        .await;

    loop {
        tokio::select! {
            frame = reader.next_frame() => match frame {
                Ok(Some(Frame::Chat { text })) => {
                    let _ = events
                        .send(HubEvent::MessageReceived {
                            from: name.clone(),
                            text: text.clone(),
                        })
                        .await;
                    broadcaster
                        .deliver(Some(handle.id()), &Frame::Chat { text }, true)
                        .await;
                }
                Ok(Some(other)) => {
                    // Repeated handshakes or a spoofed shutdown notice from
                    // a peer are never relayed.
                    debug!(%name, "ignoring unexpected frame: {other:?}");
                }
                Ok(None) => break,
                Err(e) => {
                    if handle.is_alive() {
                        debug!(%name, "read failed: {e}");
                    }
                    break;
                }
            },
            _ = handle.closed() => break,
        }
    }

    let was_registered = roster.unregister(handle.id()).is_some();
    handle.shutdown_writer().await;

    // During a drain the hub already announced its own shutdown; individual
    // leave notices would only race the teardown.
    if was_registered && !roster.is_sealed() {
        info!(%name, %addr, "peer disconnected");
        broadcaster
            .deliver(
                Some(handle.id()),
                &Frame::Chat {
                    text: format!("{name} left the chat"),
                },
                true,
            )
            .await;
        let _ = events.send(HubEvent::PeerLeft { name }).await;
    }
}
