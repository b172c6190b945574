//! Process-wide lobby directory
//!
//! Map of `lobby code -> lobby`. Code allocation retries on collision so
//! codes stay unique among active lobbies. List results are sorted by code:
//! hash-map iteration order is not deterministic and both `VIEW` and queue
//! matching need a stable order.

use std::collections::HashMap;

use partyline_core::{ident, LobbySummary};

use crate::lobby::{Lobby, LobbyKind, LobbyOptions};

/// All active lobbies, keyed by code
pub struct LobbyDirectory {
    lobbies: HashMap<String, Lobby>,
}

impl LobbyDirectory {
    pub fn new() -> Self {
        Self {
            lobbies: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }

    /// Allocate a lobby under a freshly minted code and return the code
    pub fn allocate(&mut self, opts: LobbyOptions) -> String {
        let code = loop {
            let candidate = ident::lobby_code();
            if !self.lobbies.contains_key(&candidate) {
                break candidate;
            }
        };
        self.lobbies.insert(code.clone(), Lobby::new(code.clone(), opts));
        code
    }

    pub fn get(&self, code: &str) -> Option<&Lobby> {
        self.lobbies.get(code)
    }

    pub fn get_mut(&mut self, code: &str) -> Option<&mut Lobby> {
        self.lobbies.get_mut(code)
    }

    /// Remove a lobby; its timers abort when the lobby drops
    pub fn remove(&mut self, code: &str) -> Option<Lobby> {
        self.lobbies.remove(code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lobby> {
        self.lobbies.values()
    }

    /// Look up a lobby that can still be joined: active and not full
    pub fn find_joinable(&mut self, code: &str) -> Option<&mut Lobby> {
        self.lobbies
            .get_mut(code)
            .filter(|l| l.is_active && !l.is_full())
    }

    /// Public, active, not-full lobbies for a game, sorted by code
    pub fn list_public(&self, game: &str) -> Vec<LobbySummary> {
        let mut list: Vec<LobbySummary> = self
            .lobbies
            .values()
            .filter(|l| {
                l.kind == LobbyKind::Public && l.is_active && !l.is_full() && l.game == game
            })
            .map(Lobby::summary)
            .collect();
        list.sort_by(|a, b| a.lobby_code.cmp(&b.lobby_code));
        list
    }

    /// The exact lobby under a code, if any, as a one-element listing
    pub fn list_code(&self, code: &str) -> Vec<LobbySummary> {
        self.lobbies.get(code).map(Lobby::summary).into_iter().collect()
    }

    /// Codes of active, not-full queue lobbies matching the triple
    /// `(game, maxPeers, tags)`, sorted so "first" is deterministic
    pub fn queue_matches(
        &self,
        game: &str,
        max_peers: u32,
        tags: &Option<String>,
    ) -> Vec<String> {
        let mut codes: Vec<String> = self
            .lobbies
            .values()
            .filter(|l| {
                l.kind == LobbyKind::Queue
                    && l.is_active
                    && !l.is_full()
                    && l.game == game
                    && l.max_peers == max_peers
                    && l.tags == *tags
            })
            .map(|l| l.code.clone())
            .collect();
        codes.sort();
        codes
    }
}

impl Default for LobbyDirectory {
    fn default() -> Self {
        Self::new()
    }
}
