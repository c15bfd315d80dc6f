//! Observability for overlay nodes: every node reports when it sends a packet, forwards a
//!  packet for someone else, or receives an acknowledgement. Interested parties register a
//!  [hooks::PacketTraceSink] per kind of event.

pub mod hooks;
pub mod logging_sink;
pub mod trace_line_sink;
