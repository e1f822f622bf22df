//! Whitelist reconstruction
//!
//! The whitelist is always rebuilt from a full peer store enumeration, never
//! patched. Peers beyond the capacity are silently left out.

use crate::{
    PeerAddress, PeerId, PeerIdentity, address::IdentityKey, constants::WHITELIST_CAPACITY,
    stack::PeerStore,
};
use heapless::Vec;

/// Snapshot of the peers allowed to connect during filtered advertising
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Whitelist {
    /// Enumerated peer identifiers, in store order
    pub peers: Vec<PeerId, WHITELIST_CAPACITY>,
    /// Identity addresses of the peers whose bonding data was readable
    pub addrs: Vec<PeerAddress, WHITELIST_CAPACITY>,
    /// Identity Resolving Keys of the peers that distributed one
    pub irks: Vec<IdentityKey, WHITELIST_CAPACITY>,
    /// Full identities, for the radio's address resolution list
    pub identities: Vec<PeerIdentity, WHITELIST_CAPACITY>,
}

impl Whitelist {
    /// Number of filter list entries
    ///
    /// Peers whose identity could not be read are enumerated but admit no one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    /// Whether the filter list would admit no one
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

/// Builds [`Whitelist`]s from the peer store
pub struct WhitelistBuilder;

impl WhitelistBuilder {
    /// Enumerate up to `capacity` peers (clamped to [`WHITELIST_CAPACITY`])
    ///
    /// Reads only; the store is not modified.
    pub fn build<S: PeerStore>(store: &S, capacity: usize) -> Whitelist {
        let capacity = capacity.min(WHITELIST_CAPACITY);
        let mut whitelist = Whitelist::default();
        let mut cursor = None;

        while whitelist.peers.len() < capacity {
            let Some(peer) = store.next_peer_id(cursor) else {
                break;
            };
            cursor = Some(peer);
            // Capacity is bounded above, pushes cannot fail
            whitelist.peers.push(peer).ok();

            match store.identity(peer) {
                Some(identity) => {
                    whitelist.identities.push(identity).ok();
                    whitelist.addrs.push(identity.address).ok();
                    if let Some(irk) = identity.irk {
                        whitelist.irks.push(irk).ok();
                    }
                }
                None => warn!("[WHITELIST] No identity for peer {}", peer.0),
            }
        }

        if store.peer_count() > whitelist.peers.len() {
            debug!(
                "[WHITELIST] Truncated to {} of {} peers",
                whitelist.peers.len(),
                store.peer_count()
            );
        }
        whitelist
    }
}
