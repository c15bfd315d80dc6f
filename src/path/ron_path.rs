use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use anyhow::bail;

use crate::peers::peer_entry::PeerEntry;

/// One hop of a path: a set of peers any of which is an acceptable place for the path to
///  continue or end. The client logic only ever uses single-peer destinations.
#[derive(Clone, PartialEq, Eq)]
pub struct PeerDestination {
    peers: Vec<Arc<PeerEntry>>,
}

impl Debug for PeerDestination {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set()
            .entries(self.peers.iter().map(|p| p.id))
            .finish()
    }
}

impl PeerDestination {
    pub fn new(peer: Arc<PeerEntry>) -> PeerDestination {
        PeerDestination {
            peers: vec![peer],
        }
    }

    pub fn multi(peers: Vec<Arc<PeerEntry>>) -> anyhow::Result<PeerDestination> {
        if peers.is_empty() {
            bail!("a peer destination needs at least one peer");
        }
        Ok(PeerDestination { peers })
    }

    pub fn add_peer(&mut self, peer: Arc<PeerEntry>) {
        self.peers.push(peer);
    }

    pub fn first_peer(&self) -> &PeerEntry {
        // there is at least one peer, see constructors
        &self.peers[0]
    }

    pub fn peers(&self) -> &[Arc<PeerEntry>] {
        &self.peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn contains(&self, peer: &PeerEntry) -> bool {
        self.peers.iter().any(|p| p.as_ref() == peer)
    }
}

impl From<PeerEntry> for PeerDestination {
    fn from(peer: PeerEntry) -> Self {
        PeerDestination::new(Arc::new(peer))
    }
}

impl From<Arc<PeerEntry>> for PeerDestination {
    fn from(peer: Arc<PeerEntry>) -> Self {
        PeerDestination::new(peer)
    }
}


/// A route through the overlay as an ordered sequence of hops. The first hop is the path's
///  origin, the last hop its destination. A path with a single hop is a destination without
///  any intermediates.
///
/// The path keeps track of how far it was traversed. Equality is structural, comparing hops
///  position by position and ignoring traversal progress.
#[derive(Clone)]
pub struct RonPath {
    hops: Vec<PeerDestination>,
    progress: usize,
}

impl Debug for RonPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RonPath{:?}@{}", self.hops, self.progress)
    }
}

impl PartialEq for RonPath {
    fn eq(&self, other: &Self) -> bool {
        self.hops == other.hops
    }
}
impl Eq for RonPath {}

impl RonPath {
    pub fn new(destination: PeerDestination) -> RonPath {
        RonPath {
            hops: vec![destination],
            progress: 0,
        }
    }

    pub fn from_peer(peer: impl Into<Arc<PeerEntry>>) -> RonPath {
        RonPath::new(PeerDestination::new(peer.into()))
    }

    /// appends a hop at the end, making it the path's new destination
    pub fn add_hop(&mut self, hop: PeerDestination) {
        self.hops.push(hop);
    }

    /// Inserts a hop before position `index`, `index == len()` appending it
    pub fn insert_hop(&mut self, index: usize, hop: PeerDestination) -> anyhow::Result<()> {
        if index > self.hops.len() {
            bail!("insert position {} is beyond the end of a path with {} hops", index, self.hops.len());
        }
        self.hops.insert(index, hop);
        Ok(())
    }

    /// Swaps the roles of origin and destination by reversing the order of all hops, and
    ///  starts traversal over
    pub fn reverse(&mut self) {
        self.hops.reverse();
        self.progress = 0;
    }

    pub fn origin(&self) -> &PeerDestination {
        &self.hops[0]
    }

    pub fn destination(&self) -> &PeerDestination {
        // a path is created with a hop, and hops are never removed
        &self.hops[self.hops.len() - 1]
    }

    pub fn hops(&self) -> &[PeerDestination] {
        &self.hops
    }

    pub fn iter(&self) -> impl Iterator<Item=&PeerDestination> {
        self.hops.iter()
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    /// the hop the traversal is currently at, `None` once it moved past the destination
    pub fn current_hop(&self) -> Option<&PeerDestination> {
        self.hops.get(self.progress)
    }

    pub fn progress(&self) -> usize {
        self.progress
    }

    pub fn advance(&mut self) -> Option<&PeerDestination> {
        if self.progress < self.hops.len() {
            self.progress += 1;
        }
        self.current_hop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::peers::test_peer_from_number;

    fn dest(n: u8) -> PeerDestination {
        test_peer_from_number(n).into()
    }

    #[test]
    fn test_peer_destination_equality() {
        let start = dest(0);
        let end = dest(5);

        assert_eq!(end, end);
        assert_ne!(start, end);
        assert_ne!(start, dest(3));
        assert_eq!(start, dest(0));
        assert_eq!(start.first_peer(), dest(0).first_peer());
        assert_ne!(end.first_peer(), dest(0).first_peer());
        assert_eq!(start.len(), 1);
        assert!(start.contains(&test_peer_from_number(0)));
        assert!(!start.contains(&test_peer_from_number(5)));
    }

    #[test]
    fn test_multi_peer_destination() {
        assert!(PeerDestination::multi(vec![]).is_err());

        let mut d = PeerDestination::multi(vec![Arc::new(test_peer_from_number(1)), Arc::new(test_peer_from_number(2))]).unwrap();
        assert_eq!(d.len(), 2);
        assert_eq!(d.first_peer(), &test_peer_from_number(1));
        d.add_peer(Arc::new(test_peer_from_number(3)));
        assert!(d.contains(&test_peer_from_number(3)));
        assert_ne!(d, dest(1));
    }

    #[test]
    fn test_path_equality() {
        let path0 = RonPath::new(dest(0));
        let path1 = RonPath::new(dest(5));

        assert_eq!(path0, path0);
        assert_eq!(path0, RonPath::new(dest(0)));
        assert_eq!(path0, RonPath::from_peer(test_peer_from_number(0)));
        assert_eq!(path1, RonPath::from_peer(test_peer_from_number(5)));
        assert_ne!(path0, path1);
        assert_ne!(path0.destination(), path1.destination());
        assert_eq!(path0.origin(), path0.destination());
    }

    #[test]
    fn test_add_hop() {
        let mut path0 = RonPath::new(dest(0));
        let path1 = RonPath::new(dest(5));
        path0.add_hop(dest(5));

        assert_eq!(path0.len(), 2);
        assert_eq!(path1.len(), 1);
        assert_eq!(path0.origin(), &dest(0));
        assert_eq!(path0.destination(), path1.destination());
        assert_eq!(path0.iter().nth(1), Some(&dest(5)));

        assert_ne!(path0, RonPath::new(dest(0)));
        assert_ne!(path0, RonPath::new(dest(5)));
    }

    #[test]
    fn test_insert_hop() {
        let mut path0 = RonPath::new(dest(0));
        path0.add_hop(dest(5));

        let mut path1 = RonPath::new(dest(5));
        path1.insert_hop(0, dest(0)).unwrap();
        assert_eq!(path1.origin(), &dest(0));
        assert_eq!(path1.destination(), &dest(5));
        assert_eq!(path0, path1);

        path1.add_hop(dest(3));
        assert_ne!(path0, path1);

        path0.insert_hop(1, dest(2)).unwrap();
        assert_eq!(path0.hops(), &[dest(0), dest(2), dest(5)]);

        assert!(path0.insert_hop(4, dest(4)).is_err());
        path0.insert_hop(3, dest(4)).unwrap();
        assert_eq!(path0.destination(), &dest(4));
    }

    #[test]
    fn test_reverse_reverses_hop_order() {
        let mut expected = RonPath::new(dest(0));
        expected.add_hop(dest(5));
        expected.add_hop(dest(3));

        let mut path = RonPath::new(dest(3));
        path.add_hop(dest(5));
        path.add_hop(dest(0));
        path.advance();
        path.advance();
        assert_eq!(path.progress(), 2);

        path.reverse();

        assert_eq!(path, expected);
        assert_eq!(path.origin(), &dest(0));
        assert_eq!(path.destination(), &dest(3));
        assert_eq!(path.progress(), 0);
        assert_eq!(path.current_hop(), Some(&dest(0)));
    }

    #[test]
    fn test_traversal() {
        let mut path = RonPath::new(dest(1));
        path.add_hop(dest(2));

        assert_eq!(path.current_hop(), Some(&dest(1)));
        assert_eq!(path.advance(), Some(&dest(2)));
        assert_eq!(path.advance(), None);
        assert_eq!(path.advance(), None);
        assert_eq!(path.progress(), 2);

        let fresh = RonPath::new(dest(1));
        let mut traversed = fresh.clone();
        traversed.add_hop(dest(2));
        let mut other = fresh.clone();
        other.add_hop(dest(2));
        traversed.advance();
        assert_eq!(traversed, other);
    }
}
