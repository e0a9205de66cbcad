//! # lanchat-core
//!
//! Shared library for LanChat containing the wire protocol frames and the
//! newline-delimited framing layer used by both the hub and peer roles.
//!
//! This crate has zero dependencies on sockets, configuration, or any
//! role-specific state. It defines:
//!
//! - **`protocol::frame`** – What travels over the network. Every message is
//!   one line of UTF-8 text, classified into a typed [`Frame`]: a one-time
//!   handshake, an ordinary chat line, or the hub's shutdown notice.
//!
//! - **`protocol::transport`** – How lines are recovered from a byte stream.
//!   TCP does not preserve message boundaries, so reads are buffered until a
//!   delimiter is seen and writes always append one.

pub mod protocol;

// Re-export the most-used items at the crate root so callers can write
// `lanchat_core::Frame` instead of `lanchat_core::protocol::frame::Frame`.
pub use protocol::frame::{Frame, ProtocolError, DEFAULT_PORT};
pub use protocol::transport::{write_frame, FrameReader, TransportError, MAX_LINE_BYTES};
