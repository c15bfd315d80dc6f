use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::trace;

use crate::path::heuristic::{NoValidPeerError, PathHeuristic, TriedPeers};
use crate::peers::peer_entry::PeerEntry;
use crate::peers::peer_registry::PeerRegistry;

/// Deterministic relay selection: tries peers in ascending id order, each of them once per
///  server. Useful for reproducible runs.
pub struct OrderedPathHeuristic {
    registry: Arc<RwLock<PeerRegistry>>,
    tried: TriedPeers,
}

impl OrderedPathHeuristic {
    pub fn new(registry: Arc<RwLock<PeerRegistry>>) -> OrderedPathHeuristic {
        OrderedPathHeuristic {
            registry,
            tried: TriedPeers::default(),
        }
    }
}

#[async_trait]
impl PathHeuristic for OrderedPathHeuristic {
    fn set_source_peer(&mut self, peer: Arc<PeerEntry>) {
        self.tried.set_source(peer);
    }

    async fn get_next_peer_address(&mut self, server_peer: &PeerEntry) -> Result<Ipv4Addr, NoValidPeerError> {
        let candidates = {
            let registry = self.registry.read().await;
            self.tried.candidates(&registry, server_peer)?
        };

        let chosen = &candidates[0];
        trace!("next relay to {:?} is {:?}", server_peer, chosen);
        self.tried.mark_tried(server_peer, chosen);
        Ok(chosen.address)
    }

    fn reset_history(&mut self) {
        self.tried.clear();
    }
}
