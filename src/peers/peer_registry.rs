use std::net::Ipv4Addr;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::peers::peer_entry::{OverlayNode, PeerEntry, PeerId};

/// Directory of known overlay peers, indexed both by id and by address. Both indices always
///  contain the same set of peers, and both point to the same (most recent) entry for a peer.
///
/// A registry is shared between the components of a node (and possibly between simulated
///  nodes) as an `Arc<RwLock<PeerRegistry>>` that is passed in explicitly.
#[derive(Default, Debug)]
pub struct PeerRegistry {
    by_id: FxHashMap<PeerId, Arc<PeerEntry>>,
    by_address: FxHashMap<Ipv4Addr, Arc<PeerEntry>>,
}

impl PeerRegistry {
    pub fn new() -> PeerRegistry {
        Default::default()
    }

    /// Adds a peer, replacing a previous entry with the same id. The replaced entry is returned.
    ///
    /// An address belongs to a single peer: if a different peer was registered with the new
    ///  entry's address, that peer is evicted.
    pub fn add_peer(&mut self, entry: PeerEntry) -> Option<Arc<PeerEntry>> {
        let entry = Arc::new(entry);

        if let Some(other) = self.by_address.get(&entry.address) {
            if other.id != entry.id {
                warn!("address {} moved from {:?} to {:?} - removing the former", entry.address, other, entry);
                let other_id = other.id;
                self.by_id.remove(&other_id);
            }
        }

        let previous = self.by_id.insert(entry.id, entry.clone());
        if let Some(previous) = &previous {
            if previous.address != entry.address {
                debug!("{:?} changed its address from {} to {}", entry, previous.address, entry.address);
                self.by_address.remove(&previous.address);
            }
        }
        self.by_address.insert(entry.address, entry);

        previous
    }

    /// Creates an entry from a node reference and adds it
    pub fn add_node(&mut self, node: &dyn OverlayNode) -> Option<Arc<PeerEntry>> {
        self.add_peer(PeerEntry::from_node(node))
    }

    pub fn get_peer(&self, id: PeerId) -> Option<Arc<PeerEntry>> {
        self.by_id.get(&id).cloned()
    }

    pub fn get_peer_by_address(&self, address: Ipv4Addr) -> Option<Arc<PeerEntry>> {
        self.by_address.get(&address).cloned()
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// returns `true` if the peer was present
    pub fn remove_peer(&mut self, id: PeerId) -> bool {
        match self.by_id.remove(&id) {
            Some(entry) => {
                self.by_address.remove(&entry.address);
                true
            }
            None => false,
        }
    }

    /// Records contact with a peer 'now'. Returns `false` for unknown peers.
    pub fn touch(&mut self, id: PeerId) -> bool {
        let Some(entry) = self.by_id.get(&id) else {
            return false;
        };

        let mut updated = entry.as_ref().clone();
        updated.last_contact = Instant::now();
        let updated = Arc::new(updated);
        self.by_address.insert(updated.address, updated.clone());
        self.by_id.insert(id, updated);
        true
    }

    pub fn count(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Iterates over all peers in no particular order
    pub fn iter(&self) -> impl Iterator<Item=&Arc<PeerEntry>> {
        self.by_id.values()
    }
}
