//! A resilient overlay relay: clients send datagrams directly to a server and, if no
//!  acknowledgement arrives within a timeout, retry through an overlay peer picked by a
//!  pluggable heuristic. Relays forward the packet hop by hop along the source route carried
//!  in its header.
//!
//! ## Packet header
//!
//! Every datagram starts with a header, followed by the application payload. All numbers are
//!  in network byte order (BE):
//!
//! ```ascii
//!  0: forward flag (u8) - 1 if the packet is routed through the overlay, 0 otherwise
//!  1: hop count (u8) - number of intermediate relays the packet already passed
//!  2: number of intermediate addresses N (u8)
//!  3: sequence number (u32)
//!  7: final destination (IPv4, 4 bytes)
//! 11: origin (IPv4, 4 bytes)
//! 15: N intermediate addresses (IPv4, 4 bytes each)
//! ```
//!
//! The header is 15 + 4N bytes long. A node receiving a packet looks at the next destination,
//!  i.e. the intermediate address at position `hop count`, or the final destination if all
//!  intermediates were passed. If the next destination is the final destination, the packet
//!  has arrived; otherwise the node increments the hop count and forwards it.
//!
//! ## Acknowledgement
//!
//! A server acknowledges a packet by reversing its header (swapping origin and destination,
//!  reversing the intermediates, resetting the hop count) and sending it back, so the
//!  acknowledgement travels the same route in reverse.
//!
//! ## Retry
//!
//! A client keeps one retry cycle in flight: a direct send, and if that times out, a send via
//!  a relay. Any acknowledgement ends the cycle.

pub mod packet;
pub mod peers;
pub mod path;
pub mod transport;
pub mod trace;
pub mod client;
pub mod server;
pub mod util;
pub mod test_util;
