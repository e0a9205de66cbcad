//! Application layer for the node: registries and state machines.
//!
//! # Sub-modules
//!
//! - **`roster`** – The concurrency-safe registry of connected peers, plus
//!   the per-peer handle through which the broadcaster writes to them. It
//!   performs no socket I/O of its own – the network loops in
//!   `infrastructure` drive it.
//!
//! - **`role`** – The hub-or-peer role controller: exactly one role may be
//!   active in a process at a time, and switching requires a full stop.
//!   This is the one module that reaches into `infrastructure`, because it
//!   owns whichever live role is running.

pub mod role;
pub mod roster;
