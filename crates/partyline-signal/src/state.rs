//! Shared server state

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::directory::LobbyDirectory;
use crate::registry::PeerRegistry;

/// Peer registry and lobby directory under a single lock.
///
/// Command handlers, lifecycle events, and timer bodies all mutate state
/// through this one mutex, which serializes them the way a cooperative
/// single-threaded runtime would. Critical sections never await; outbound
/// sends are unbounded-channel enqueues and cannot block.
pub struct ServerState {
    pub peers: PeerRegistry,
    pub lobbies: LobbyDirectory,
}

/// Handle passed to connection tasks and timers
pub type SharedState = Arc<Mutex<ServerState>>;

impl ServerState {
    pub fn new() -> Self {
        Self {
            peers: PeerRegistry::new(),
            lobbies: LobbyDirectory::new(),
        }
    }

    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(Self::new()))
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}
