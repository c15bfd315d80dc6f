use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::net::Ipv4Addr;

use tokio::time::Instant;

pub type PeerId = u32;

/// Geographic position of a peer. Heuristics may use it to prefer relays that are far away
///  from a failed direct route.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}
impl Location {
    pub fn new(x: f64, y: f64, z: f64) -> Location {
        Location { x, y, z }
    }

    pub fn distance(&self, other: &Location) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2)).sqrt()
    }
}

/// A node's view of the things a peer entry is built from: its identity, its network address
///  and its location. This is what a peer is 'observed' from when it joins.
pub trait OverlayNode {
    fn id(&self) -> PeerId;
    fn address(&self) -> Ipv4Addr;
    fn location(&self) -> Location;
}

/// A node description with fixed values, e.g. from configuration
#[derive(Clone, Debug)]
pub struct StaticNode {
    pub id: PeerId,
    pub address: Ipv4Addr,
    pub location: Location,
}
impl OverlayNode for StaticNode {
    fn id(&self) -> PeerId {
        self.id
    }

    fn address(&self) -> Ipv4Addr {
        self.address
    }

    fn location(&self) -> Location {
        self.location
    }
}


/// A known overlay peer. Peers are identified by `id` alone: equality, ordering and hashing
///  ignore all other fields.
#[derive(Clone)]
pub struct PeerEntry {
    pub id: PeerId,
    pub address: Ipv4Addr,
    pub location: Location,
    pub last_contact: Instant,
}

impl PeerEntry {
    pub fn new(id: PeerId, address: Ipv4Addr, location: Location) -> PeerEntry {
        PeerEntry {
            id,
            address,
            location,
            last_contact: Instant::now(),
        }
    }

    pub fn from_node(node: &dyn OverlayNode) -> PeerEntry {
        PeerEntry::new(node.id(), node.address(), node.location())
    }
}

impl Debug for PeerEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[peer {}@{}]", self.id, self.address)
    }
}

impl PartialEq for PeerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for PeerEntry {}

impl Hash for PeerEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for PeerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for PeerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}
