//! WebSocket serving loop and process-wide tickers

use std::io;
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use sysinfo::{Pid, ProcessExt, System, SystemExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info};

use partyline_core::{decode, CloseCode};

use crate::state::{ServerState, SharedState};
use crate::{dispatch, lifecycle, KEEPALIVE_INTERVAL, MEMORY_REPORT_INTERVAL};

/// The signaling server
pub struct SignalServer {
    state: SharedState,
}

impl SignalServer {
    pub fn new() -> Self {
        Self {
            state: ServerState::shared(),
        }
    }

    /// Bind and serve forever
    pub async fn serve(&self, addr: SocketAddr) -> io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("signal server listening on {}", addr);
        self.serve_on(listener).await
    }

    /// Serve connections from an already-bound listener
    pub async fn serve_on(&self, listener: TcpListener) -> io::Result<()> {
        tokio::spawn(keepalive_loop(self.state.clone()));
        tokio::spawn(memory_report_loop());

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            let state = self.state.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, state).await {
                    debug!("connection error from {}: {:?}", peer_addr, e);
                }
            });
        }
    }

    /// Connected peer count (for monitoring)
    pub async fn peer_count(&self) -> usize {
        self.state.lock().await.peers.len()
    }

    /// Active lobby count (for monitoring)
    pub async fn lobby_count(&self) -> usize {
        self.state.lock().await.lobbies.len()
    }
}

impl Default for SignalServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle a single WebSocket connection from upgrade to teardown
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    shared: SharedState,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Outbound traffic goes through a channel so handlers never block on
    // the socket. Forwarding a close frame ends the writer; the channel
    // closing (peer dropped on disconnect) ends it too.
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() {
                break;
            }
            if closing {
                break;
            }
        }
    });

    let Some(peer_id) = lifecycle::connect(&shared, tx).await else {
        // refused at the cap; the writer drains the refusal frames
        let _ = writer.await;
        return Ok(());
    };
    debug!("connection from {} is peer {}", peer_addr, peer_id);

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let mut st = shared.lock().await;
                match decode(&text) {
                    Ok(cmd) => dispatch::dispatch(&mut st, &shared, peer_id, cmd),
                    Err(e) => {
                        debug!(peer = peer_id, "malformed frame: {}", e);
                        dispatch::send_err(&st, peer_id, CloseCode::BadProto);
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                let st = shared.lock().await;
                if let Some(peer) = st.peers.get(peer_id) {
                    peer.send(Message::Pong(payload));
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(peer = peer_id, "websocket error: {:?}", e);
                break;
            }
        }
    }

    lifecycle::disconnect(&shared, peer_id).await;
    let _ = writer.await;

    debug!("connection closed: peer {}", peer_id);
    Ok(())
}

/// Ping every live transport at a fixed cadence
pub(crate) async fn keepalive_loop(shared: SharedState) {
    let mut ticker = tokio::time::interval(KEEPALIVE_INTERVAL);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let st = shared.lock().await;
        for peer in st.peers.iter() {
            peer.send(Message::Ping(Vec::new().into()));
        }
    }
}

/// Periodically log the process's resident memory
async fn memory_report_loop() {
    let mut sys = System::new();
    let pid = Pid::from(std::process::id() as usize);
    let mut ticker = tokio::time::interval(MEMORY_REPORT_INTERVAL);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        sys.refresh_process(pid);
        if let Some(proc) = sys.process(pid) {
            info!(rss_mb = proc.memory() / 1024 / 1024, "process memory usage");
        }
    }
}
