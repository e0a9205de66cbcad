//! Protocol module containing the typed frames and the line framing layer.

pub mod frame;
pub mod transport;

pub use frame::{Frame, ProtocolError};
pub use transport::{write_frame, FrameReader, TransportError};
