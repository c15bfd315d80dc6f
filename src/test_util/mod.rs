//! Utilities for testing overlay functionality. They are used by this crate's own tests, and
//!  they are exported for testing applications that build on the overlay: a simulated network
//!  that connects nodes in memory, a trace sink that records events, and helpers for creating
//!  peers.

pub mod peers;
pub mod sim_network;
pub mod trace;
