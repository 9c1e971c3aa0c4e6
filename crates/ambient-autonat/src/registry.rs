//! AutoNAT peer registry and probe selection.
//!
//! Peers enter the registry when the host reports a connection from a peer
//! that offers the AutoNAT protocol. Nothing is ever removed here; a peer
//! that has gone away simply fails its probe.
//!
//! Selection for a cycle prefers peers that are connected right now and only
//! falls back to the whole registry when none are. The result is shuffled so
//! successive cycles do not always lead with the same peer.

use crate::host::{AUTONAT_PROTOCOL, ConnectionObserver, Connectivity, PeerId};
use dashmap::DashSet;
use rand::Rng;
use rand::seq::SliceRandom;

/// Set of peers known to answer dial-back requests
///
/// Outside this crate peers only arrive through
/// [`ConnectionObserver::connected`], which checks the protocol:
///
/// ```compile_fail
/// let registry = ambient_autonat::PeerRegistry::new();
/// registry.insert(ambient_autonat::PeerId::random());
/// ```
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: DashSet<PeerId>,
}

impl PeerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer, returning true if it was not known before
    pub(crate) fn insert(&self, peer: PeerId) -> bool {
        self.peers.insert(peer)
    }

    /// Whether `peer` is known
    #[must_use]
    pub fn contains(&self, peer: &PeerId) -> bool {
        self.peers.contains(peer)
    }

    /// Number of known peers
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether no peers are known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Copy of the current membership, in no particular order
    #[must_use]
    pub fn snapshot(&self) -> Vec<PeerId> {
        self.peers.iter().map(|peer| *peer).collect()
    }

    /// Pick the peers to probe this cycle, in probe order
    ///
    /// Returns the connected subset of the registry if it is non-empty,
    /// otherwise every known peer. Either way the list is uniformly shuffled.
    pub fn select_probe_peers<C, R>(&self, connectivity: &C, rng: &mut R) -> Vec<PeerId>
    where
        C: Connectivity + ?Sized,
        R: Rng + ?Sized,
    {
        let known = self.snapshot();
        if known.is_empty() {
            return known;
        }

        let connected: Vec<PeerId> = known
            .iter()
            .copied()
            .filter(|peer| connectivity.is_connected(peer))
            .collect();

        let mut peers = if connected.is_empty() {
            tracing::debug!(
                "No connected AutoNAT peers, falling back to {} known peers",
                known.len()
            );
            known
        } else {
            connected
        };

        peers.shuffle(rng);
        peers
    }
}

impl ConnectionObserver for PeerRegistry {
    fn connected(&self, peer: PeerId, protocols: &[String]) {
        if !protocols.iter().any(|p| p == AUTONAT_PROTOCOL) {
            tracing::trace!("Peer {} does not offer {}", peer, AUTONAT_PROTOCOL);
            return;
        }

        if self.insert(peer) {
            tracing::info!("Discovered AutoNAT peer {}", peer);
        }
    }

    fn disconnected(&self, peer: &PeerId) {
        tracing::trace!("Peer {} disconnected", peer);
    }
}
