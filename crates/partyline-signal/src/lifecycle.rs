//! Connection lifecycle and lobby timers
//!
//! Connect mints a peer, greets it with `ID`, and arms its idle timers.
//! Disconnect detaches first and notifies second, so nothing can re-enter a
//! lobby mid-destruction. The lobby reap and queue-probe timers live here
//! too; each body re-checks its subject under the lock before acting.

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use partyline_core::protocol::frames;
use partyline_core::CloseCode;

use crate::peer::PeerId;
use crate::state::{ServerState, SharedState};
use crate::timer::TimerHandle;
use crate::{EARLY_IDLE_TIMEOUT, LOBBY_REAP_TIMEOUT, PEER_LIFETIME, QUEUE_PROBE_INTERVAL};

/// Admit a new transport: enforce the connection cap, mint a peer, start
/// its timers, and open the conversation with `ID`. Returns `None` when the
/// connection was refused.
pub async fn connect(shared: &SharedState, tx: UnboundedSender<Message>) -> Option<PeerId> {
    let mut st = shared.lock().await;

    if st.peers.at_capacity() {
        warn!("connection cap reached, refusing peer");
        let _ = tx.send(Message::Text(frames::err(CloseCode::TooManyPeers).into()));
        let _ = tx.send(Message::Close(Some(CloseFrame {
            code: CloseCode::TooManyPeers.code().into(),
            reason: CloseCode::TooManyPeers.reason().into(),
        })));
        return None;
    }

    let id = st.peers.register(tx);
    if let Some(peer) = st.peers.get_mut(id) {
        peer.early_timer = Some(spawn_early_idle(shared.clone(), id));
        peer.lifetime_timer = Some(spawn_lifetime(shared.clone(), id));
        peer.send_text(frames::id());
    }
    debug!(peer = id, connected = st.peers.len(), "peer connected");
    Some(id)
}

/// Transport closed: drop the peer and run lobby teardown
pub async fn disconnect(shared: &SharedState, id: PeerId) {
    let mut st = shared.lock().await;
    disconnect_peer(&mut st, id);
}

/// Teardown body, also the re-entry point for tests
pub fn disconnect_peer(st: &mut ServerState, id: PeerId) {
    let Some(mut peer) = st.peers.remove(id) else {
        return;
    };
    peer.cancel_timers();
    debug!(peer = id, connected = st.peers.len(), "peer disconnected");

    let Some(code) = peer.lobby_code.take() else {
        return;
    };
    let Some(lobby) = st.lobbies.get_mut(&code) else {
        return;
    };
    let was_active = lobby.is_active;

    if peer.is_host {
        // detach everyone and drop the lobby before a single KICK goes out
        let members: Vec<PeerId> = lobby.peers.iter().copied().filter(|&p| p != id).collect();
        lobby.peers.clear();
        lobby.cancel_timers();
        st.lobbies.remove(&code);

        let mut notify = Vec::new();
        for pid in members {
            if let Some(p) = st.peers.get_mut(pid) {
                let lobby_id = p.lobby_id;
                p.detach_from_lobby();
                notify.push((pid, lobby_id));
            }
        }
        // a sealed lobby is already being closed by START; stay quiet
        if was_active {
            for (pid, lobby_id) in notify {
                if let Some(p) = st.peers.get(pid) {
                    p.send_text(frames::kick(lobby_id, false));
                }
            }
        }
        info!(lobby = %code, "lobby torn down after host departure");
    } else {
        lobby.remove_peer(id);
        let remaining = lobby.peers.clone();
        if remaining.is_empty() {
            st.lobbies.remove(&code);
        } else if was_active {
            for pid in remaining {
                if let Some(p) = st.peers.get(pid) {
                    p.send_text(frames::kick(peer.lobby_id, true));
                }
            }
        }
    }
}

/// Forcibly dissolve a lobby whose reap timer elapsed: detach members, drop
/// the lobby, then tell every ex-member it is out
pub fn reap_lobby(st: &mut ServerState, code: &str) {
    let Some(lobby) = st.lobbies.get_mut(code) else {
        return;
    };
    let members: Vec<PeerId> = lobby.peers.drain(..).collect();
    lobby.cancel_timers();
    st.lobbies.remove(code);

    let mut notify = Vec::new();
    for pid in members {
        if let Some(p) = st.peers.get_mut(pid) {
            let lobby_id = p.lobby_id;
            p.detach_from_lobby();
            notify.push((pid, lobby_id));
        }
    }
    for (pid, lobby_id) in notify {
        if let Some(p) = st.peers.get(pid) {
            p.send_text(frames::kick(lobby_id, false));
        }
    }
    info!(lobby = %code, "idle lobby reaped");
}

pub(crate) fn spawn_early_idle(shared: SharedState, id: PeerId) -> TimerHandle {
    TimerHandle::spawn(async move {
        tokio::time::sleep(EARLY_IDLE_TIMEOUT).await;
        let st = shared.lock().await;
        if let Some(peer) = st.peers.get(id) {
            if peer.game.is_none() {
                debug!(peer = id, "closing connection that never identified");
                peer.close(CloseCode::Idle);
            }
        }
    })
}

pub(crate) fn spawn_lifetime(shared: SharedState, id: PeerId) -> TimerHandle {
    TimerHandle::spawn(async move {
        tokio::time::sleep(PEER_LIFETIME).await;
        let st = shared.lock().await;
        if let Some(peer) = st.peers.get(id) {
            info!(peer = id, "closing connection at lifetime cap");
            peer.close(CloseCode::Idle);
        }
    })
}

pub(crate) fn spawn_reap_timer(shared: SharedState, code: String) -> TimerHandle {
    TimerHandle::spawn(async move {
        tokio::time::sleep(LOBBY_REAP_TIMEOUT).await;
        let mut st = shared.lock().await;
        reap_lobby(&mut st, &code);
    })
}

/// While a queue lobby is full and still active, prod its host with an
/// empty `READY` every interval
pub(crate) fn spawn_queue_probe(shared: SharedState, code: String) -> TimerHandle {
    TimerHandle::spawn(async move {
        let mut ticker = tokio::time::interval(QUEUE_PROBE_INTERVAL);
        // the immediate first tick
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let st = shared.lock().await;
            let Some(lobby) = st.lobbies.get(&code) else {
                return;
            };
            if lobby.is_active && lobby.is_full() {
                if let Some(host) = lobby.host().and_then(|h| st.peers.get(h)) {
                    host.send_text(frames::ready(&Value::Null));
                }
            }
        }
    })
}
