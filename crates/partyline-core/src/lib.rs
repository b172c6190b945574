//! Partyline wire protocol
//!
//! Shared types for the partyline signaling protocol: the `{call, data}`
//! envelope codec, close/error codes, and identifier minting. Game clients
//! written in Rust can depend on this crate without pulling in the server.
//!
//! # Protocol
//!
//! 1. Server greets a new connection with `ID` and the client answers with
//!    its game profile
//! 2. Clients host, join, or queue into lobbies identified by six-letter codes
//! 3. The server relays RTC offers/answers/candidates between lobby members
//! 4. The host starts the game and everyone drops the signaling connection

pub mod ident;
pub mod protocol;

pub use protocol::{decode, Call, ClientCommand, CloseCode, LobbySummary, ProtocolError};
