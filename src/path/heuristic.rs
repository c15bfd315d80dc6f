use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::peers::peer_entry::{PeerEntry, PeerId};
use crate::peers::peer_registry::PeerRegistry;

/// A path heuristic has no (further) relay to offer. This is a regular outcome of relay
///  selection, and callers are expected to give up on the current retry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NoValidPeerError {
    NoSourcePeer,
    NoCandidates { server: PeerId },
    Exhausted { server: PeerId, num_tried: usize },
}
impl Display for NoValidPeerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NoValidPeerError::NoSourcePeer => write!(f, "no source peer configured for path selection"),
            NoValidPeerError::NoCandidates { server } => write!(f, "no overlay peers to relay to server {}", server),
            NoValidPeerError::Exhausted { server, num_tried } => write!(f, "all {} overlay peers were tried for server {}", num_tried, server),
        }
    }
}
impl std::error::Error for NoValidPeerError {}


/// Policy for picking the relay through which a packet is retried after the direct route
///  failed.
///
/// Implementations must never offer the source peer itself, and they must report exhaustion
///  (rather than repeating themselves forever) once there are no more peers worth trying.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PathHeuristic: Send + Sync {
    /// the peer this heuristic runs on
    fn set_source_peer(&mut self, peer: Arc<PeerEntry>);

    async fn get_next_peer_address(&mut self, server_peer: &PeerEntry) -> Result<Ipv4Addr, NoValidPeerError>;

    /// Forgets which relays were tried. Called whenever a new packet starts its retry cycle.
    fn reset_history(&mut self);
}


/// Bookkeeping shared by heuristics that try every peer at most once per server
#[derive(Default)]
pub(crate) struct TriedPeers {
    source: Option<Arc<PeerEntry>>,
    tried: FxHashMap<PeerId, FxHashSet<PeerId>>,
}
impl TriedPeers {
    pub fn set_source(&mut self, peer: Arc<PeerEntry>) {
        self.source = Some(peer);
    }

    pub fn clear(&mut self) {
        self.tried.clear();
    }

    /// Untried candidates for relaying to `server`, sorted by id
    pub fn candidates(&self, registry: &PeerRegistry, server: &PeerEntry) -> Result<Vec<Arc<PeerEntry>>, NoValidPeerError> {
        let Some(source) = &self.source else {
            return Err(NoValidPeerError::NoSourcePeer);
        };

        let mut all = registry.iter()
            .filter(|p| p.id != source.id && p.address != source.address)
            .filter(|p| p.id != server.id && p.address != server.address)
            .cloned()
            .collect::<Vec<_>>();
        if all.is_empty() {
            return Err(NoValidPeerError::NoCandidates { server: server.id });
        }

        let tried = self.tried.get(&server.id);
        let num_candidates = all.len();
        all.retain(|p| !tried.map(|t| t.contains(&p.id)).unwrap_or(false));
        if all.is_empty() {
            return Err(NoValidPeerError::Exhausted { server: server.id, num_tried: num_candidates });
        }

        all.sort();
        Ok(all)
    }

    pub fn mark_tried(&mut self, server: &PeerEntry, peer: &PeerEntry) {
        self.tried.entry(server.id)
            .or_default()
            .insert(peer.id);
    }
}
