//! RoleController: hub-or-peer selection for one process.
//!
//! ```text
//!        ┌──start_hub──► Hub ──stop──┐
//! Idle ──┤                           ├──► Idle
//!        └──connect────► Peer ─stop──┘
//! ```
//!
//! At most one role is active at a time; the invalid "hub and peer at once"
//! state is unrepresentable because the controller holds a single tagged
//! variant rather than independent flags. Switching roles requires the
//! previous role to be fully stopped first – starting a role while one is
//! active is rejected synchronously. A failed start leaves the controller
//! Idle.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::infrastructure::network::hub::{Hub, HubConfig, HubError, HubEvent};
use crate::infrastructure::network::peer::{PeerConnection, PeerError, PeerEvent};

/// Error type for role selection.
#[derive(Debug, Error)]
pub enum RoleError {
    /// A role is already active; stop it before switching.
    #[error("the {0} role is already active; stop it before switching")]
    RoleActive(&'static str),

    /// The hub role failed to start.
    #[error(transparent)]
    Hub(#[from] HubError),

    /// The peer role failed to start.
    #[error(transparent)]
    Peer(#[from] PeerError),
}

/// Which role, if any, is currently running.
pub enum Role {
    Idle,
    Hub(Hub),
    Peer(PeerConnection),
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Idle => "idle",
            Role::Hub(_) => "hub",
            Role::Peer(_) => "peer",
        }
    }
}

/// Owns whichever role is active and enforces mutual exclusion between them.
#[derive(Default)]
pub struct RoleController {
    role: Role,
}

impl Default for Role {
    fn default() -> Self {
        Role::Idle
    }
}

impl RoleController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.role, Role::Idle)
    }

    pub fn role_name(&self) -> &'static str {
        self.role.name()
    }

    /// The running hub, when the hub role is active.
    pub fn hub(&self) -> Option<&Hub> {
        match &self.role {
            Role::Hub(hub) => Some(hub),
            _ => None,
        }
    }

    /// The running peer connection, when the peer role is active.
    pub fn peer(&self) -> Option<&PeerConnection> {
        match &self.role {
            Role::Peer(peer) => Some(peer),
            _ => None,
        }
    }

    /// Starts the hub role.
    ///
    /// # Errors
    ///
    /// Returns [`RoleError::RoleActive`] while any role is running and
    /// [`RoleError::Hub`] when binding fails – in which case the controller
    /// stays Idle.
    pub async fn start_hub(
        &mut self,
        config: HubConfig,
    ) -> Result<mpsc::Receiver<HubEvent>, RoleError> {
        self.ensure_idle()?;
        let (hub, events) = Hub::start(config).await?;
        self.role = Role::Hub(hub);
        Ok(events)
    }

    /// Starts the peer role by connecting to a hub.
    ///
    /// # Errors
    ///
    /// Returns [`RoleError::RoleActive`] while any role is running and
    /// [`RoleError::Peer`] when the hub is unreachable – in which case the
    /// controller stays Idle.
    pub async fn connect(
        &mut self,
        addr: SocketAddr,
        name: &str,
    ) -> Result<mpsc::Receiver<PeerEvent>, RoleError> {
        self.ensure_idle()?;
        let (peer, events) = PeerConnection::connect(addr, name).await?;
        self.role = Role::Peer(peer);
        Ok(events)
    }

    /// Stops whichever role is active and returns to Idle.
    ///
    /// Idempotent: stopping an Idle controller does nothing.
    pub async fn stop(&mut self) {
        match std::mem::take(&mut self.role) {
            Role::Idle => {}
            Role::Hub(hub) => hub.stop().await,
            Role::Peer(peer) => peer.disconnect().await,
        }
    }

    fn ensure_idle(&self) -> Result<(), RoleError> {
        match &self.role {
            Role::Idle => Ok(()),
            active => Err(RoleError::RoleActive(active.name())),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
//
// Transitions that need live sockets are exercised end-to-end in
// `tests/role_lifecycle.rs`; here only the pure state rules are checked.
