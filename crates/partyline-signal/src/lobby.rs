//! Lobby state machine
//!
//! One instance per lobby. The dispatcher and lifecycle own all mutation;
//! this module keeps the invariant-bearing plumbing: ordered peer list with
//! the host first, the sealed flag, and the two lobby timers.

use partyline_core::LobbySummary;

use crate::peer::PeerId;
use crate::timer::TimerHandle;

/// Lobby visibility/matching kind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LobbyKind {
    Private,
    Public,
    Queue,
}

impl LobbyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LobbyKind::Private => "PRIVATE",
            LobbyKind::Public => "PUBLIC",
            LobbyKind::Queue => "QUEUE",
        }
    }
}

/// Construction record for a lobby. Defaults are applied at the dispatch
/// layer so validation failures short-circuit before any allocation.
#[derive(Clone, Debug)]
pub struct LobbyOptions {
    pub game: String,
    pub kind: LobbyKind,
    pub max_peers: u32,
    pub is_mesh: bool,
    pub tags: Option<String>,
}

/// A named group of peers negotiating an RTC session
pub struct Lobby {
    /// Six-letter public code, unique among active lobbies
    pub code: String,
    pub kind: LobbyKind,
    pub game: String,
    pub max_peers: u32,
    /// Topology hint, passed through to clients unchanged
    pub is_mesh: bool,
    /// Opaque equality key for queue matching
    pub tags: Option<String>,
    /// Ordered member list; the host is always first
    pub peers: Vec<PeerId>,
    /// Accepting joins and relaying while true; sealed by READY/START or
    /// host departure
    pub is_active: bool,
    /// Full-lobby probe, queue lobbies only
    pub queue_timer: Option<TimerHandle>,
    /// Absolute lifetime reaper
    pub reap_timer: Option<TimerHandle>,
}

impl Lobby {
    pub fn new(code: String, opts: LobbyOptions) -> Self {
        Self {
            code,
            kind: opts.kind,
            game: opts.game,
            max_peers: opts.max_peers,
            is_mesh: opts.is_mesh,
            tags: opts.tags,
            peers: Vec::new(),
            is_active: true,
            queue_timer: None,
            reap_timer: None,
        }
    }

    pub fn is_full(&self) -> bool {
        self.peers.len() >= self.max_peers as usize
    }

    /// The host's peer id (first member)
    pub fn host(&self) -> Option<PeerId> {
        self.peers.first().copied()
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.peers.contains(&id)
    }

    /// Remove a member; returns whether it was present
    pub fn remove_peer(&mut self, id: PeerId) -> bool {
        let before = self.peers.len();
        self.peers.retain(|p| *p != id);
        self.peers.len() != before
    }

    /// Drop both lobby timers, aborting them
    pub fn cancel_timers(&mut self) {
        self.queue_timer.take();
        self.reap_timer.take();
    }

    /// Wire representation for `VIEW` replies
    pub fn summary(&self) -> LobbySummary {
        LobbySummary {
            lobby_code: self.code.clone(),
            peer_count: self.peers.len(),
            is_active: self.is_active,
            lobby_type: self.kind.as_str().to_owned(),
            max_peers: self.max_peers,
            tags: self.tags.clone(),
            is_mesh: self.is_mesh,
        }
    }
}
