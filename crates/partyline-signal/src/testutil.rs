//! Shared helpers for dispatcher and lifecycle tests

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_tungstenite::tungstenite::Message;

use crate::peer::{PeerId, HOST_LOBBY_ID};
use crate::state::ServerState;

/// Register a peer backed by a bare channel so emissions can be asserted
/// without a socket. No lifecycle timers are armed.
pub fn add_peer(st: &mut ServerState) -> (PeerId, UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = st.peers.register(tx);
    (id, rx)
}

/// Pop the next queued frame as `(call, data)`
pub fn next_frame(rx: &mut UnboundedReceiver<Message>) -> (u64, Value) {
    match rx.try_recv() {
        Ok(Message::Text(text)) => {
            let frame: Value = serde_json::from_str(&text).expect("valid frame json");
            let call = frame["call"].as_u64().expect("integer call");
            (call, frame["data"].clone())
        }
        other => panic!("expected a text frame, got {:?}", other),
    }
}

/// Pop the next queued message and expect a close frame; returns its code
pub fn next_close(rx: &mut UnboundedReceiver<Message>) -> u16 {
    match rx.try_recv() {
        Ok(Message::Close(Some(frame))) => frame.code.into(),
        other => panic!("expected a close frame, got {:?}", other),
    }
}

pub fn assert_silent(rx: &mut UnboundedReceiver<Message>) {
    if let Ok(msg) = rx.try_recv() {
        panic!("expected no traffic, got {:?}", msg);
    }
}

pub fn drain(rx: &mut UnboundedReceiver<Message>) {
    while rx.try_recv().is_ok() {}
}

/// Check every cross-cutting invariant of the coordination state
pub fn assert_invariants(st: &ServerState) {
    let mut membership: HashMap<PeerId, String> = HashMap::new();

    for lobby in st.lobbies.iter() {
        assert!(
            !lobby.peers.is_empty(),
            "lobby {} is empty but still listed",
            lobby.code
        );
        assert!(
            lobby.peers.len() <= lobby.max_peers as usize,
            "lobby {} over capacity",
            lobby.code
        );

        let mut lobby_ids = HashSet::new();
        let mut hosts = 0;
        for (i, &pid) in lobby.peers.iter().enumerate() {
            let prev = membership.insert(pid, lobby.code.clone());
            assert!(prev.is_none(), "peer {} is in two lobbies", pid);

            let peer = st.peers.get(pid).expect("lobby member is registered");
            assert_eq!(
                peer.lobby_code.as_deref(),
                Some(lobby.code.as_str()),
                "peer {} back-reference is stale",
                pid
            );
            assert!(
                lobby_ids.insert(peer.lobby_id),
                "duplicate lobby id in {}",
                lobby.code
            );
            if peer.is_host {
                hosts += 1;
                assert_eq!(i, 0, "host of {} is not first", lobby.code);
                assert_eq!(peer.lobby_id, HOST_LOBBY_ID);
            }
        }
        assert_eq!(hosts, 1, "lobby {} must have exactly one host", lobby.code);
    }

    for peer in st.peers.iter() {
        if let Some(code) = &peer.lobby_code {
            let lobby = st.lobbies.get(code).expect("peer points at a live lobby");
            assert!(
                lobby.contains(peer.id),
                "peer {} points at {} but is not a member",
                peer.id,
                code
            );
        }
    }
}
