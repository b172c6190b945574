//! Connected peer state

use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use partyline_core::CloseCode;

use crate::timer::TimerHandle;

/// 31-bit peer identifier, unique among connected peers
pub type PeerId = u32;

/// The host's fixed identifier inside its lobby
pub const HOST_LOBBY_ID: PeerId = 1;

/// One connected client
pub struct Peer {
    pub id: PeerId,

    /// Identifier inside the current lobby: 1 for the host, the peer's own
    /// id otherwise
    pub lobby_id: PeerId,

    pub is_host: bool,

    /// Game profile, set by the `ID` handshake
    pub game: Option<String>,

    /// Code of the lobby this peer belongs to, resolved on use. Holding the
    /// code rather than a reference means a reaped lobby can never be
    /// reached through a surviving peer.
    pub lobby_code: Option<String>,

    /// Outbound channel drained by the connection's writer task
    tx: UnboundedSender<Message>,

    /// Fires if the `ID` handshake never completes
    pub early_timer: Option<TimerHandle>,

    /// Absolute lifetime cap
    pub lifetime_timer: Option<TimerHandle>,
}

impl Peer {
    pub fn new(id: PeerId, tx: UnboundedSender<Message>) -> Self {
        Self {
            id,
            lobby_id: id,
            is_host: false,
            game: None,
            lobby_code: None,
            tx,
            early_timer: None,
            lifetime_timer: None,
        }
    }

    /// Queue a text frame; fire-and-forget
    pub fn send_text(&self, json: String) {
        let _ = self.tx.send(Message::Text(json.into()));
    }

    /// Queue a raw WebSocket message; fire-and-forget
    pub fn send(&self, msg: Message) {
        let _ = self.tx.send(msg);
    }

    /// Queue a close frame; the writer task shuts the transport after
    /// forwarding it
    pub fn close(&self, code: CloseCode) {
        let frame = CloseFrame {
            code: code.code().into(),
            reason: code.reason().into(),
        };
        let _ = self.tx.send(Message::Close(Some(frame)));
    }

    /// Drop both lifecycle timers, aborting them
    pub fn cancel_timers(&mut self) {
        self.early_timer.take();
        self.lifetime_timer.take();
    }

    /// Clear lobby membership state
    pub fn detach_from_lobby(&mut self) {
        self.lobby_code = None;
        self.is_host = false;
        self.lobby_id = self.id;
    }
}
