use std::net::Ipv4Addr;

use crate::peers::peer_entry::{Location, PeerEntry};
use crate::peers::peer_registry::PeerRegistry;

pub fn test_addr_from_number(number: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, number)
}

/// A peer with id `number` at address 10.0.0.`number`
pub fn test_peer_from_number(number: u8) -> PeerEntry {
    PeerEntry::new(number as u32, test_addr_from_number(number), Location::new(number as f64, 0.0, 0.0))
}

pub fn test_registry(numbers: &[u8]) -> PeerRegistry {
    let mut registry = PeerRegistry::new();
    for &n in numbers {
        registry.add_peer(test_peer_from_number(n));
    }
    registry
}
