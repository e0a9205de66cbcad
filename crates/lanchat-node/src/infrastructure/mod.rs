//! Infrastructure layer for the node.
//!
//! Contains OS-facing adapters: TCP listeners and connections, and
//! file-system configuration storage. Builds on the `application` roster
//! and on `lanchat_core`.

pub mod network;
pub mod storage;
