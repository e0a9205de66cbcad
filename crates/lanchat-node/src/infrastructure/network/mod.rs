//! Network infrastructure for the node.
//!
//! # Sub-modules
//!
//! - **`hub`** – The server role: a TCP accept loop that spawns one
//!   connection handler per peer, and the drain logic that tears everything
//!   down on stop.
//!
//! - **`broadcast`** – The fan-out relay: delivers one frame to every
//!   registered peer except an optional origin, with a bounded write
//!   deadline per destination.
//!
//! - **`peer`** – The client role: one outbound connection to a hub, a
//!   receive loop, and a send path.

pub mod broadcast;
pub mod hub;
pub mod peer;

use std::net::{IpAddr, Ipv4Addr};

/// Best-effort discovery of this machine's LAN address, for operator
/// display only.
///
/// Connecting a UDP socket sends no packets; it merely asks the OS which
/// local interface would route to the target. Falls back to loopback when
/// the machine has no route at all.
pub fn local_ip() -> IpAddr {
    let fallback = IpAddr::V4(Ipv4Addr::LOCALHOST);
    let Ok(socket) = std::net::UdpSocket::bind(("0.0.0.0", 0)) else {
        return fallback;
    };
    if socket.connect(("8.8.8.8", 80)).is_err() {
        return fallback;
    }
    socket.local_addr().map(|a| a.ip()).unwrap_or(fallback)
}
