use std::marker::PhantomData;
use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::trace;

use crate::path::heuristic::{NoValidPeerError, PathHeuristic, TriedPeers};
use crate::peers::peer_entry::PeerEntry;
use crate::peers::peer_registry::PeerRegistry;
use crate::util::random::{Random, RngRandom};

/// Picks a relay uniformly at random among all peers that were not tried for the server yet
pub struct RandomPathHeuristic<R: Random = RngRandom> {
    registry: Arc<RwLock<PeerRegistry>>,
    tried: TriedPeers,
    _random: PhantomData<fn() -> R>,
}

impl RandomPathHeuristic<RngRandom> {
    pub fn new(registry: Arc<RwLock<PeerRegistry>>) -> RandomPathHeuristic<RngRandom> {
        Self::new_with_random(registry)
    }
}

impl<R: Random> RandomPathHeuristic<R> {
    pub fn new_with_random(registry: Arc<RwLock<PeerRegistry>>) -> RandomPathHeuristic<R> {
        RandomPathHeuristic {
            registry,
            tried: TriedPeers::default(),
            _random: Default::default(),
        }
    }
}

#[async_trait]
impl<R: Random> PathHeuristic for RandomPathHeuristic<R> {
    fn set_source_peer(&mut self, peer: Arc<PeerEntry>) {
        self.tried.set_source(peer);
    }

    async fn get_next_peer_address(&mut self, server_peer: &PeerEntry) -> Result<Ipv4Addr, NoValidPeerError> {
        let candidates = {
            let registry = self.registry.read().await;
            self.tried.candidates(&registry, server_peer)?
        };

        let chosen = &candidates[R::gen_usize_range(0..candidates.len())];
        trace!("picked {:?} out of {} candidates to relay to {:?}", chosen, candidates.len(), server_peer);

        self.tried.mark_tried(server_peer, chosen);
        Ok(chosen.address)
    }

    fn reset_history(&mut self) {
        self.tried.clear();
    }
}
