//! Partyline Signal Server
//!
//! WebRTC signaling and lobby coordination for peer-to-peer games. Clients
//! connect over WebSocket, discover each other through short-lived lobbies,
//! exchange RTC session descriptions, then drop the connection and play
//! directly. The server never carries game traffic.
//!
//! # Protocol
//!
//! 1. Server greets with `ID`; the client answers with its game profile
//! 2. A client hosts a lobby, joins one by code, or queues for matchmaking
//! 3. Lobby members relay offers/answers/ICE candidates through the server
//! 4. The host issues `START`; everyone is disconnected to go play

use std::time::Duration;

pub mod directory;
pub mod dispatch;
pub mod lifecycle;
pub mod lobby;
pub mod peer;
pub mod registry;
pub mod server;
pub mod state;
pub mod timer;

#[cfg(test)]
pub(crate) mod testutil;

pub use server::SignalServer;
pub use state::{ServerState, SharedState};

/// Default WebSocket port
pub const DEFAULT_PORT: u16 = 8080;

/// Maximum simultaneous connections
pub const MAX_CONNS: usize = 4096;

/// Close the connection if the `ID` handshake has not completed by then
pub const EARLY_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Absolute cap on a peer connection's lifetime
pub const PEER_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Lobbies are reaped this long after creation
pub const LOBBY_REAP_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Queue lobbies prod their host at this cadence while full
pub const QUEUE_PROBE_INTERVAL: Duration = Duration::from_secs(10);

/// Deferral between a `JOIN` reply and its `ADD` notifications, so the
/// reply is always observed first
pub const ADD_NOTIFY_DELAY: Duration = Duration::from_millis(50);

/// Settle delay before host-to-peer `READY` probes
pub const READY_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Stagger between the `START` broadcast and the transport closes
pub const START_CLOSE_STAGGER: Duration = Duration::from_millis(250);

/// Keepalive ping cadence
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Memory usage report cadence
pub const MEMORY_REPORT_INTERVAL: Duration = Duration::from_secs(120);
