//! Broadcaster: fan-out relay from one origin to every other peer.
//!
//! Delivery works on a roster snapshot, so registration churn during a
//! fan-out can never invalidate the iteration. Each destination write is
//! bounded by a deadline; a destination that fails or times out is recorded
//! and reaped only after every other destination has been attempted, so one
//! dead peer cannot cut the rest of the room out of a message.
//!
//! Ordering: each connection handler awaits `deliver` to completion before
//! reading its next line, and every destination has a single serialised
//! writer, so two messages from the same origin reach each destination in
//! the order they were sent. No ordering is promised *across* destinations.

use std::sync::Arc;
use std::time::Duration;

use lanchat_core::Frame;
use tracing::{debug, info, warn};

use crate::application::roster::{PeerId, Roster};

/// Fan-out relay over a shared roster.
#[derive(Clone)]
pub struct Broadcaster {
    roster: Arc<Roster>,
    write_deadline: Duration,
}

impl Broadcaster {
    pub fn new(roster: Arc<Roster>, write_deadline: Duration) -> Self {
        Self {
            roster,
            write_deadline,
        }
    }

    /// Delivers `frame` to every registered peer.
    ///
    /// When `exclude_origin` is true the peer identified by `origin` is
    /// skipped – a sender is never echoed its own relayed line. Pass
    /// `exclude_origin = false` for administrative announcements that every
    /// peer must see.
    ///
    /// Peers that could not be written within the deadline are unregistered
    /// and closed after the pass. A timed-out write may have left a partial
    /// line on that connection, so the peer is closed, never retried.
    pub async fn deliver(&self, origin: Option<PeerId>, frame: &Frame, exclude_origin: bool) {
        let snapshot = self.roster.snapshot();
        let mut failed = Vec::new();

        for peer in snapshot {
            if exclude_origin && origin == Some(peer.id()) {
                continue;
            }
            match tokio::time::timeout(self.write_deadline, peer.send(frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(name = %peer.name(), addr = %peer.addr(), "write failed: {e}");
                    failed.push(peer);
                }
                Err(_) => {
                    warn!(
                        name = %peer.name(),
                        addr = %peer.addr(),
                        "write exceeded {:?} deadline",
                        self.write_deadline
                    );
                    failed.push(peer);
                }
            }
        }

        for peer in failed {
            if self.roster.unregister(peer.id()).is_some() {
                info!(name = %peer.name(), addr = %peer.addr(), "dropping unreachable peer");
            }
            peer.close();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
