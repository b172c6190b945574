//! Signal protocol envelope and messages
//!
//! Every frame is a JSON text message `{"call": N, "data": {...}}`. The
//! opcode space is shared between directions; meaning depends on who sends.
//! Client frames decode into [`ClientCommand`]; server frames are built by
//! the constructors in [`frames`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Protocol opcodes carried in the `call` field
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Call {
    Id = 0,
    Host = 1,
    Join = 2,
    Queue = 3,
    View = 4,
    Add = 5,
    Kick = 6,
    Offer = 7,
    Answer = 8,
    Candidate = 9,
    Ready = 10,
    Start = 11,
    Err = 12,
}

impl Call {
    /// Map a wire integer to an opcode
    pub fn from_wire(n: i64) -> Option<Call> {
        Some(match n {
            0 => Call::Id,
            1 => Call::Host,
            2 => Call::Join,
            3 => Call::Queue,
            4 => Call::View,
            5 => Call::Add,
            6 => Call::Kick,
            7 => Call::Offer,
            8 => Call::Answer,
            9 => Call::Candidate,
            10 => Call::Ready,
            11 => Call::Start,
            12 => Call::Err,
            _ => return None,
        })
    }
}

/// Close codes, used both in WebSocket close frames and in `ERR` payloads
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseCode {
    /// Normal closure once the host starts the game
    StartGame,
    BadView,
    BadJoin,
    UnknownPeer,
    LobbyNotFound,
    BadProto,
    BadHost,
    /// Early-idle or lifetime timeout
    Idle,
    BadQueue,
    UnknownErr,
    BadMessage,
    TooManyPeers,
}

impl CloseCode {
    /// Numeric wire code
    pub fn code(self) -> u16 {
        match self {
            CloseCode::StartGame => 1000,
            CloseCode::BadView => 4000,
            CloseCode::BadJoin => 4001,
            CloseCode::UnknownPeer => 4003,
            CloseCode::LobbyNotFound => 4004,
            CloseCode::BadProto => 4005,
            CloseCode::BadHost => 4006,
            CloseCode::Idle => 4008,
            CloseCode::BadQueue => 4010,
            CloseCode::UnknownErr => 4017,
            CloseCode::BadMessage => 4022,
            CloseCode::TooManyPeers => 4029,
        }
    }

    /// Canonical reason string
    pub fn reason(self) -> &'static str {
        match self {
            CloseCode::StartGame => "Closing peer connection to start game",
            CloseCode::BadView => "BAD_VIEW",
            CloseCode::BadJoin => "BAD_JOIN",
            CloseCode::UnknownPeer => "UNKNOWN_PEER",
            CloseCode::LobbyNotFound => "LOBBY_NOT_FOUND",
            CloseCode::BadProto => "BAD_PROTO",
            CloseCode::BadHost => "BAD_HOST",
            CloseCode::Idle => "IDLE_SOCKET_CONN",
            CloseCode::BadQueue => "BAD_QUEUE",
            CloseCode::UnknownErr => "UNKNOWN_ERR",
            CloseCode::BadMessage => "BAD_MESSAGE",
            CloseCode::TooManyPeers => "TOO_MANY_PEERS",
        }
    }
}

/// Decode failures for inbound frames
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid JSON frame: {0}")]
    Json(String),

    #[error("call is not an integer")]
    BadCall,

    #[error("opcode {0} out of range")]
    UnknownOpcode(i64),

    #[error("opcode {0:?} is server-to-client only")]
    ServerOnly(Call),
}

/// `HOST` payload
#[derive(Clone, Debug, PartialEq)]
pub struct HostArgs {
    pub game: Option<String>,
    pub is_public: bool,
    pub is_mesh: bool,
    pub max_peers: Option<i64>,
    pub tags: Option<String>,
}

/// `QUEUE` payload
#[derive(Clone, Debug, PartialEq)]
pub struct QueueArgs {
    pub game: Option<String>,
    pub max_peers: Option<i64>,
    pub is_mesh: bool,
    pub tags: Option<String>,
}

/// `OFFER`/`ANSWER` payload; the SDP body is opaque and relayed verbatim
#[derive(Clone, Debug, PartialEq)]
pub struct RelayArgs {
    pub to_id: Option<i64>,
    pub payload: Value,
}

/// `CANDIDATE` payload; all fields but `toId` are opaque
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateArgs {
    pub to_id: Option<i64>,
    pub media: Value,
    pub index: Value,
    pub sdp: Value,
}

/// A decoded client frame
#[derive(Clone, Debug, PartialEq)]
pub enum ClientCommand {
    Id { game: Option<String> },
    Host(HostArgs),
    Join { game: Option<String>, lobby_code: Option<String> },
    Queue(QueueArgs),
    View { game: Option<String>, lobby_code: Option<String> },
    Kick { id: Option<i64> },
    Offer(RelayArgs),
    Answer(RelayArgs),
    Candidate(CandidateArgs),
    Ready { id: Option<i64>, data: Value },
    Start,
}

/// One lobby entry in a `VIEW` reply
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LobbySummary {
    pub lobby_code: String,
    pub peer_count: usize,
    pub is_active: bool,
    pub lobby_type: String,
    pub max_peers: u32,
    pub tags: Option<String>,
    pub is_mesh: bool,
}

/// Decode a client text frame into a typed command.
///
/// Numeric fields are coerced by truncation toward zero; missing optional
/// fields take their documented defaults (`isMesh` true, `isPublic` false).
pub fn decode(text: &str) -> Result<ClientCommand, ProtocolError> {
    let frame: Value = serde_json::from_str(text).map_err(|e| ProtocolError::Json(e.to_string()))?;

    let call = frame
        .get("call")
        .and_then(Value::as_i64)
        .ok_or(ProtocolError::BadCall)?;
    let call = Call::from_wire(call).ok_or(ProtocolError::UnknownOpcode(call))?;

    let data = frame.get("data").cloned().unwrap_or(Value::Null);

    let cmd = match call {
        Call::Id => ClientCommand::Id {
            game: field_str(&data, "game"),
        },
        Call::Host => ClientCommand::Host(HostArgs {
            game: field_str(&data, "game"),
            is_public: field_bool(&data, "isPublic").unwrap_or(false),
            is_mesh: field_bool(&data, "isMesh").unwrap_or(true),
            max_peers: field_int(&data, "maxPeers"),
            tags: field_str(&data, "tags"),
        }),
        Call::Join => ClientCommand::Join {
            game: field_str(&data, "game"),
            lobby_code: field_str(&data, "lobbyCode"),
        },
        Call::Queue => ClientCommand::Queue(QueueArgs {
            game: field_str(&data, "game"),
            max_peers: field_int(&data, "maxPeers"),
            is_mesh: field_bool(&data, "isMesh").unwrap_or(true),
            tags: field_str(&data, "tags"),
        }),
        Call::View => ClientCommand::View {
            game: field_str(&data, "game"),
            lobby_code: field_str(&data, "lobbyCode"),
        },
        Call::Kick => ClientCommand::Kick {
            id: field_int(&data, "id"),
        },
        Call::Offer => ClientCommand::Offer(RelayArgs {
            to_id: field_int(&data, "toId"),
            payload: data.get("offer").cloned().unwrap_or(Value::Null),
        }),
        Call::Answer => ClientCommand::Answer(RelayArgs {
            to_id: field_int(&data, "toId"),
            payload: data.get("answer").cloned().unwrap_or(Value::Null),
        }),
        Call::Candidate => ClientCommand::Candidate(CandidateArgs {
            to_id: field_int(&data, "toId"),
            media: data.get("media").cloned().unwrap_or(Value::Null),
            index: data.get("index").cloned().unwrap_or(Value::Null),
            sdp: data.get("sdp").cloned().unwrap_or(Value::Null),
        }),
        Call::Ready => ClientCommand::Ready {
            id: field_int(&data, "id"),
            data,
        },
        Call::Start => ClientCommand::Start,
        Call::Add | Call::Err => return Err(ProtocolError::ServerOnly(call)),
    };

    Ok(cmd)
}

fn field_str(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn field_int(data: &Value, key: &str) -> Option<i64> {
    let v = data.get(key)?;
    if let Some(n) = v.as_i64() {
        Some(n)
    } else {
        // truncate toward zero
        v.as_f64().map(|f| f as i64)
    }
}

fn field_bool(data: &Value, key: &str) -> Option<bool> {
    data.get(key).and_then(Value::as_bool)
}

/// Server frame constructors. Each returns the JSON text ready to send.
pub mod frames {
    use super::{Call, CloseCode, LobbySummary};
    use serde_json::{json, Value};

    fn envelope(call: Call, data: Value) -> String {
        json!({ "call": call as u8, "data": data }).to_string()
    }

    /// Opening greeting; the client must answer with its game profile
    pub fn id() -> String {
        envelope(Call::Id, json!({}))
    }

    pub fn host(id: u32, lobby_code: &str, is_mesh: bool) -> String {
        envelope(
            Call::Host,
            json!({ "id": id, "lobbyCode": lobby_code, "isMesh": is_mesh }),
        )
    }

    pub fn join(id: u32, is_mesh: bool, lobby_code: &str) -> String {
        envelope(
            Call::Join,
            json!({ "id": id, "isMesh": is_mesh, "lobbyCode": lobby_code }),
        )
    }

    pub fn queue(id: u32, lobby_code: &str, is_mesh: bool, is_host: bool) -> String {
        envelope(
            Call::Queue,
            json!({ "id": id, "lobbyCode": lobby_code, "isMesh": is_mesh, "isHost": is_host }),
        )
    }

    pub fn view(lobby_list: &[LobbySummary]) -> String {
        envelope(Call::View, json!({ "lobbyList": lobby_list }))
    }

    pub fn add(peer_id: u32) -> String {
        envelope(Call::Add, json!({ "peerId": peer_id }))
    }

    pub fn kick(id: u32, lobby_alive: bool) -> String {
        envelope(Call::Kick, json!({ "id": id, "lobbyAlive": lobby_alive }))
    }

    pub fn offer(from_id: u32, offer: &Value) -> String {
        envelope(Call::Offer, json!({ "fromId": from_id, "offer": offer }))
    }

    pub fn answer(from_id: u32, answer: &Value) -> String {
        envelope(Call::Answer, json!({ "fromId": from_id, "answer": answer }))
    }

    pub fn candidate(from_id: u32, media: &Value, index: &Value, sdp: &Value) -> String {
        envelope(
            Call::Candidate,
            json!({ "fromId": from_id, "media": media, "index": index, "sdp": sdp }),
        )
    }

    /// Host-to-peer readiness probe
    pub fn ready_probe(id: u32, peer_count: usize) -> String {
        envelope(
            Call::Ready,
            json!({ "id": id, "peerCount": peer_count, "status": Value::Null }),
        )
    }

    /// Forward a peer's readiness payload verbatim (also the queue probe,
    /// which carries empty data)
    pub fn ready(data: &Value) -> String {
        let data = if data.is_null() { json!({}) } else { data.clone() };
        envelope(Call::Ready, data)
    }

    pub fn start() -> String {
        envelope(Call::Start, json!({}))
    }

    pub fn err(code: CloseCode) -> String {
        envelope(
            Call::Err,
            json!({ "code": code.code(), "reason": code.reason() }),
        )
    }
}
