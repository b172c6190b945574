//! Command dispatcher
//!
//! Consumes one decoded client command at a time under the state lock and
//! applies the lobby/peer operation it names. Handlers are synchronous
//! functions of `(state, peer, command)`; anything that must happen later
//! (`ADD` notifications, `READY` probes, `START` closes) is scheduled onto
//! the runtime and re-validates its subject when it fires.

use serde_json::Value;
use tracing::{debug, info};

use partyline_core::protocol::{frames, CandidateArgs, HostArgs, QueueArgs, RelayArgs};
use partyline_core::{ClientCommand, CloseCode};

use crate::lifecycle;
use crate::lobby::{LobbyKind, LobbyOptions};
use crate::peer::{PeerId, HOST_LOBBY_ID};
use crate::state::{ServerState, SharedState};
use crate::{ADD_NOTIFY_DELAY, READY_SETTLE_DELAY, START_CLOSE_STAGGER};

/// Apply one client command. The caller holds the state lock; `shared` is
/// only cloned into deferred tasks.
pub fn dispatch(st: &mut ServerState, shared: &SharedState, peer_id: PeerId, cmd: ClientCommand) {
    match cmd {
        ClientCommand::Id { game } => handle_id(st, peer_id, game),
        ClientCommand::Host(args) => handle_host(st, shared, peer_id, args),
        ClientCommand::Join { game, lobby_code } => {
            handle_join(st, shared, peer_id, game, lobby_code)
        }
        ClientCommand::Queue(args) => handle_queue(st, shared, peer_id, args),
        ClientCommand::View { game, lobby_code } => handle_view(st, peer_id, game, lobby_code),
        ClientCommand::Kick { id } => handle_kick(st, peer_id, id),
        ClientCommand::Offer(args) => handle_offer(st, peer_id, args),
        ClientCommand::Answer(args) => handle_answer(st, peer_id, args),
        ClientCommand::Candidate(args) => handle_candidate(st, peer_id, args),
        ClientCommand::Ready { id, data } => handle_ready(st, shared, peer_id, id, data),
        ClientCommand::Start => handle_start(st, shared, peer_id),
    }
}

/// Reply with an `ERR` frame; the connection is retained
pub fn send_err(st: &ServerState, peer_id: PeerId, code: CloseCode) {
    if let Some(peer) = st.peers.get(peer_id) {
        peer.send_text(frames::err(code));
    }
}

fn handle_id(st: &mut ServerState, peer_id: PeerId, game: Option<String>) {
    let Some(peer) = st.peers.get_mut(peer_id) else {
        return;
    };
    match game {
        Some(game) => {
            debug!(peer = peer_id, game = %game, "peer identified");
            peer.game = Some(game);
            // handshake complete
            peer.early_timer.take();
        }
        None => peer.close(CloseCode::UnknownPeer),
    }
}

fn handle_host(st: &mut ServerState, shared: &SharedState, peer_id: PeerId, args: HostArgs) {
    let Some(peer) = st.peers.get(peer_id) else {
        return;
    };

    let max_peers = args
        .max_peers
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n >= 2);
    let (Some(game), Some(max_peers)) = (args.game, max_peers) else {
        send_err(st, peer_id, CloseCode::BadHost);
        return;
    };
    if peer.lobby_code.is_some() {
        send_err(st, peer_id, CloseCode::BadHost);
        return;
    }

    let kind = if args.is_public {
        LobbyKind::Public
    } else {
        LobbyKind::Private
    };
    let code = st.lobbies.allocate(LobbyOptions {
        game,
        kind,
        max_peers,
        is_mesh: args.is_mesh,
        tags: args.tags,
    });
    if let Some(lobby) = st.lobbies.get_mut(&code) {
        lobby.peers.push(peer_id);
        lobby.reap_timer = Some(lifecycle::spawn_reap_timer(shared.clone(), code.clone()));
    }
    if let Some(peer) = st.peers.get_mut(peer_id) {
        peer.is_host = true;
        peer.lobby_id = HOST_LOBBY_ID;
        peer.lobby_code = Some(code.clone());
        peer.send_text(frames::host(HOST_LOBBY_ID, &code, args.is_mesh));
    }
    info!(peer = peer_id, lobby = %code, "lobby hosted");
}

fn handle_join(
    st: &mut ServerState,
    shared: &SharedState,
    peer_id: PeerId,
    game: Option<String>,
    lobby_code: Option<String>,
) {
    let Some(peer) = st.peers.get(peer_id) else {
        return;
    };
    // the joiner's game is accepted but not matched against the lobby's;
    // the code is what grants entry
    let (Some(_), Some(code)) = (game, lobby_code) else {
        send_err(st, peer_id, CloseCode::BadJoin);
        return;
    };
    if peer.lobby_code.is_some() {
        send_err(st, peer_id, CloseCode::BadJoin);
        return;
    }

    let Some(is_mesh) = admit_to_lobby(st, shared, peer_id, &code) else {
        send_err(st, peer_id, CloseCode::LobbyNotFound);
        return;
    };
    if let Some(peer) = st.peers.get(peer_id) {
        peer.send_text(frames::join(peer_id, is_mesh, &code));
    }
    info!(peer = peer_id, lobby = %code, "peer joined lobby");
}

fn handle_queue(st: &mut ServerState, shared: &SharedState, peer_id: PeerId, args: QueueArgs) {
    let Some(peer) = st.peers.get(peer_id) else {
        return;
    };

    let max_peers = args
        .max_peers
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n >= 1);
    let (Some(game), Some(max_peers)) = (args.game, max_peers) else {
        send_err(st, peer_id, CloseCode::BadQueue);
        return;
    };
    if peer.lobby_code.is_some() {
        send_err(st, peer_id, CloseCode::BadQueue);
        return;
    }

    // A queue joins an existing lobby only when more than one lobby matches
    // the (game, maxPeers, tags) triple; with zero or one match it opens a
    // fresh one. "First" is the smallest code so matching is deterministic.
    let matches = st.lobbies.queue_matches(&game, max_peers, &args.tags);
    if matches.len() > 1 {
        let code = matches.into_iter().next().unwrap_or_default();
        let Some(is_mesh) = admit_to_lobby(st, shared, peer_id, &code) else {
            send_err(st, peer_id, CloseCode::BadQueue);
            return;
        };
        if let Some(peer) = st.peers.get(peer_id) {
            peer.send_text(frames::queue(peer_id, &code, is_mesh, false));
        }
        info!(peer = peer_id, lobby = %code, "peer matched into queue lobby");
    } else {
        let code = st.lobbies.allocate(LobbyOptions {
            game,
            kind: LobbyKind::Queue,
            max_peers,
            is_mesh: args.is_mesh,
            tags: args.tags,
        });
        if let Some(lobby) = st.lobbies.get_mut(&code) {
            lobby.peers.push(peer_id);
            lobby.reap_timer = Some(lifecycle::spawn_reap_timer(shared.clone(), code.clone()));
            lobby.queue_timer = Some(lifecycle::spawn_queue_probe(shared.clone(), code.clone()));
        }
        if let Some(peer) = st.peers.get_mut(peer_id) {
            peer.is_host = true;
            peer.lobby_id = HOST_LOBBY_ID;
            peer.lobby_code = Some(code.clone());
            peer.send_text(frames::queue(HOST_LOBBY_ID, &code, args.is_mesh, true));
        }
        info!(peer = peer_id, lobby = %code, "queue lobby opened");
    }
}

/// Add a peer to a joinable lobby as a non-host and schedule the mutual
/// `ADD` notifications. Returns the lobby's mesh flag, or `None` when no
/// joinable lobby exists under the code.
fn admit_to_lobby(
    st: &mut ServerState,
    shared: &SharedState,
    peer_id: PeerId,
    code: &str,
) -> Option<bool> {
    let is_mesh = {
        let lobby = st.lobbies.find_joinable(code)?;
        lobby.peers.push(peer_id);
        lobby.is_mesh
    };

    // capture the crossing pairs now; membership when the deferral fires
    // decides delivery
    let mut others: Vec<(PeerId, PeerId)> = Vec::new();
    if let Some(lobby) = st.lobbies.get(code) {
        for &pid in &lobby.peers {
            if pid == peer_id {
                continue;
            }
            if let Some(p) = st.peers.get(pid) {
                others.push((pid, p.lobby_id));
            }
        }
    }

    if let Some(peer) = st.peers.get_mut(peer_id) {
        peer.is_host = false;
        peer.lobby_id = peer_id;
        peer.lobby_code = Some(code.to_owned());
    }

    schedule_add_notifications(shared.clone(), code.to_owned(), peer_id, others);
    Some(is_mesh)
}

/// Deliver the mutual `ADD`s after a short deferral so the join reply is
/// always the first thing the joining peer observes
fn schedule_add_notifications(
    shared: SharedState,
    code: String,
    joiner: PeerId,
    others: Vec<(PeerId, PeerId)>,
) {
    tokio::spawn(async move {
        tokio::time::sleep(ADD_NOTIFY_DELAY).await;
        let st = shared.lock().await;
        let Some(lobby) = st.lobbies.get(&code) else {
            return;
        };
        if !lobby.contains(joiner) {
            return;
        }
        let Some(joined) = st.peers.get(joiner) else {
            return;
        };
        for (pid, their_lobby_id) in others {
            if !lobby.contains(pid) {
                continue;
            }
            if let Some(existing) = st.peers.get(pid) {
                existing.send_text(frames::add(joined.lobby_id));
                joined.send_text(frames::add(their_lobby_id));
            }
        }
    });
}

fn handle_view(
    st: &mut ServerState,
    peer_id: PeerId,
    game: Option<String>,
    lobby_code: Option<String>,
) {
    let Some(game) = game else {
        send_err(st, peer_id, CloseCode::BadView);
        return;
    };
    let list = match lobby_code {
        Some(code) => st.lobbies.list_code(&code),
        None => st.lobbies.list_public(&game),
    };
    if let Some(peer) = st.peers.get(peer_id) {
        peer.send_text(frames::view(&list));
    }
}

fn handle_kick(st: &mut ServerState, peer_id: PeerId, id: Option<i64>) {
    let Some(peer) = st.peers.get(peer_id) else {
        return;
    };
    let (Some(id), Some(code)) = (id, peer.lobby_code.clone()) else {
        send_err(st, peer_id, CloseCode::BadMessage);
        return;
    };
    let is_host = peer.is_host;
    let own_lobby_id = peer.lobby_id;
    let Ok(target_lobby_id) = u32::try_from(id) else {
        debug!(peer = peer_id, id, "kick names an impossible id");
        return;
    };

    if is_host && target_lobby_id == HOST_LOBBY_ID {
        disband_lobby(st, &code);
        return;
    }

    let target = if is_host {
        find_by_lobby_id(st, &code, target_lobby_id)
    } else if target_lobby_id == own_lobby_id {
        // a non-host may only remove itself
        Some(peer_id)
    } else {
        debug!(peer = peer_id, id, "kick without authority ignored");
        return;
    };

    let Some(target) = target else {
        debug!(lobby = %code, id, "kick names no such peer");
        return;
    };
    remove_member(st, &code, target, target_lobby_id);
}

/// Host self-kick: notify everyone (host included), detach all members,
/// drop the lobby
fn disband_lobby(st: &mut ServerState, code: &str) {
    let Some(lobby) = st.lobbies.get_mut(code) else {
        return;
    };
    lobby.is_active = false;
    lobby.cancel_timers();
    let members = lobby.peers.clone();
    for &pid in &members {
        if let Some(p) = st.peers.get(pid) {
            p.send_text(frames::kick(HOST_LOBBY_ID, false));
        }
    }
    for &pid in &members {
        if let Some(p) = st.peers.get_mut(pid) {
            p.detach_from_lobby();
        }
    }
    st.lobbies.remove(code);
    info!(lobby = %code, "lobby disbanded by host");
}

/// Remove one non-host member and notify whoever remains
fn remove_member(st: &mut ServerState, code: &str, target: PeerId, kicked_lobby_id: u32) {
    if let Some(lobby) = st.lobbies.get_mut(code) {
        lobby.remove_peer(target);
    }
    if let Some(p) = st.peers.get_mut(target) {
        p.detach_from_lobby();
    }
    let remaining = st
        .lobbies
        .get(code)
        .map(|l| l.peers.clone())
        .unwrap_or_default();
    for pid in remaining {
        if let Some(p) = st.peers.get(pid) {
            p.send_text(frames::kick(kicked_lobby_id, true));
        }
    }
    info!(lobby = %code, peer = target, "peer kicked");
}

fn find_by_lobby_id(st: &ServerState, code: &str, lobby_id: u32) -> Option<PeerId> {
    let lobby = st.lobbies.get(code)?;
    lobby.peers.iter().copied().find(|&pid| {
        st.peers
            .get(pid)
            .map_or(false, |p| p.lobby_id == lobby_id)
    })
}

fn handle_offer(st: &mut ServerState, peer_id: PeerId, args: RelayArgs) {
    relay(st, peer_id, args.to_id, |from| {
        frames::offer(from, &args.payload)
    });
}

fn handle_answer(st: &mut ServerState, peer_id: PeerId, args: RelayArgs) {
    relay(st, peer_id, args.to_id, |from| {
        frames::answer(from, &args.payload)
    });
}

fn handle_candidate(st: &mut ServerState, peer_id: PeerId, args: CandidateArgs) {
    relay(st, peer_id, args.to_id, |from| {
        frames::candidate(from, &args.media, &args.index, &args.sdp)
    });
}

/// Forward an RTC payload to the lobbymate with `lobby_id == to_id`. The
/// payload is never inspected; errors go to the sender only.
fn relay(
    st: &ServerState,
    peer_id: PeerId,
    to_id: Option<i64>,
    build: impl FnOnce(u32) -> String,
) {
    let Some(peer) = st.peers.get(peer_id) else {
        return;
    };
    let from = peer.lobby_id;
    let (Some(code), Some(to_id)) = (
        peer.lobby_code.as_deref(),
        to_id.and_then(|n| u32::try_from(n).ok()),
    ) else {
        send_err(st, peer_id, CloseCode::BadMessage);
        return;
    };

    match find_by_lobby_id(st, code, to_id).and_then(|pid| st.peers.get(pid)) {
        Some(target) => target.send_text(build(from)),
        None => send_err(st, peer_id, CloseCode::BadMessage),
    }
}

fn handle_ready(
    st: &mut ServerState,
    shared: &SharedState,
    peer_id: PeerId,
    id: Option<i64>,
    data: Value,
) {
    let Some(peer) = st.peers.get(peer_id) else {
        return;
    };
    let Some(code) = peer.lobby_code.clone() else {
        send_err(st, peer_id, CloseCode::BadMessage);
        return;
    };

    if peer.is_host {
        let Some(lobby) = st.lobbies.get_mut(&code) else {
            send_err(st, peer_id, CloseCode::BadMessage);
            return;
        };
        // no further joins once readiness collection begins
        lobby.is_active = false;
        let only = id.and_then(|n| u32::try_from(n).ok());
        schedule_ready_probes(shared.clone(), code.clone(), only);
        info!(lobby = %code, "lobby sealed for readiness");
    } else {
        // readiness status is opaque; hand it to the host verbatim
        let host = st
            .lobbies
            .get(&code)
            .and_then(|l| l.host())
            .and_then(|hid| st.peers.get(hid));
        if let Some(host) = host {
            host.send_text(frames::ready(&data));
        }
    }
}

/// Probe non-host peers for readiness after a settle delay; `only` narrows
/// the fan-out to a single lobby id
fn schedule_ready_probes(shared: SharedState, code: String, only: Option<u32>) {
    tokio::spawn(async move {
        tokio::time::sleep(READY_SETTLE_DELAY).await;
        let st = shared.lock().await;
        let Some(lobby) = st.lobbies.get(&code) else {
            return;
        };
        let peer_count = lobby.peers.len().saturating_sub(1);
        for &pid in &lobby.peers {
            let Some(p) = st.peers.get(pid) else {
                continue;
            };
            if p.is_host {
                continue;
            }
            if only.is_some_and(|id| p.lobby_id != id) {
                continue;
            }
            p.send_text(frames::ready_probe(p.lobby_id, peer_count));
        }
    });
}

fn handle_start(st: &mut ServerState, shared: &SharedState, peer_id: PeerId) {
    let Some(peer) = st.peers.get(peer_id) else {
        return;
    };
    let Some(code) = peer.lobby_code.clone() else {
        send_err(st, peer_id, CloseCode::BadMessage);
        return;
    };
    if !peer.is_host {
        debug!(peer = peer_id, lobby = %code, "START from non-host ignored");
        return;
    }
    let Some(lobby) = st.lobbies.get_mut(&code) else {
        send_err(st, peer_id, CloseCode::BadMessage);
        return;
    };

    lobby.is_active = false;
    let members = lobby.peers.clone();
    for &pid in &members {
        if pid == peer_id {
            continue;
        }
        if let Some(p) = st.peers.get(pid) {
            p.send_text(frames::start());
        }
    }
    info!(lobby = %code, "game starting");
    schedule_start_closes(shared.clone(), code);
}

/// Close every member with `START_GAME` after the stagger, host last so it
/// observes its peers leaving first
fn schedule_start_closes(shared: SharedState, code: String) {
    tokio::spawn(async move {
        tokio::time::sleep(START_CLOSE_STAGGER).await;
        let st = shared.lock().await;
        let Some(lobby) = st.lobbies.get(&code) else {
            return;
        };
        let host = lobby.host();
        for &pid in &lobby.peers {
            if Some(pid) == host {
                continue;
            }
            if let Some(p) = st.peers.get(pid) {
                p.close(CloseCode::StartGame);
            }
        }
        if let Some(host) = host.and_then(|h| st.peers.get(h)) {
            host.send_text(frames::start());
            host.close(CloseCode::StartGame);
        }
    });
}
