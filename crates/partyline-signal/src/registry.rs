//! Process-wide peer registry

use std::collections::HashMap;

use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::Message;

use partyline_core::ident;

use crate::peer::{Peer, PeerId};
use crate::MAX_CONNS;

/// All connected peers, keyed by id
pub struct PeerRegistry {
    peers: HashMap<PeerId, Peer>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            peers: HashMap::new(),
        }
    }

    /// Number of live transports
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Whether the connection cap has been reached
    pub fn at_capacity(&self) -> bool {
        self.peers.len() >= MAX_CONNS
    }

    /// Mint a fresh id and register a new peer for this transport
    pub fn register(&mut self, tx: UnboundedSender<Message>) -> PeerId {
        let id = loop {
            let candidate = ident::peer_id();
            if !self.peers.contains_key(&candidate) {
                break candidate;
            }
        };
        self.peers.insert(id, Peer::new(id, tx));
        id
    }

    pub fn get(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(&id)
    }

    pub fn get_mut(&mut self, id: PeerId) -> Option<&mut Peer> {
        self.peers.get_mut(&id)
    }

    pub fn remove(&mut self, id: PeerId) -> Option<Peer> {
        self.peers.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
