//! Lobby code and peer id minting
//!
//! Both draws are uniform. Collision retry lives with the owners of the live
//! sets: the lobby directory retries codes against active lobbies and the
//! peer registry retries ids against connected peers.

/// Length of a lobby code in letters
pub const LOBBY_CODE_LEN: usize = 6;

/// Number of six-letter uppercase words (26^6)
const LOBBY_CODE_SPACE: u32 = 308_915_776;

/// Generate a random lobby code (six uppercase letters, e.g. "QWERTY").
///
/// Draws a uniform integer over `AAAAAA..=ZZZZZZ` by rejection sampling and
/// renders it in base 26.
pub fn lobby_code() -> String {
    let limit = u32::MAX - u32::MAX % LOBBY_CODE_SPACE;
    let mut n = loop {
        let r = random_u32();
        if r < limit {
            break r % LOBBY_CODE_SPACE;
        }
    };

    let mut letters = [0u8; LOBBY_CODE_LEN];
    for slot in letters.iter_mut().rev() {
        *slot = b'A' + (n % 26) as u8;
        n /= 26;
    }
    letters.iter().map(|b| *b as char).collect()
}

/// Generate a random peer id: uniform over `[2, 2^31)`.
///
/// Ids 0 and 1 are never minted; 1 is the host's fixed per-lobby id and a
/// non-host peer uses its own id inside a lobby.
pub fn peer_id() -> u32 {
    loop {
        let id = random_u32() & 0x7fff_ffff;
        if id >= 2 {
            return id;
        }
    }
}

fn random_u32() -> u32 {
    let mut bytes = [0u8; 4];
    getrandom::getrandom(&mut bytes).expect("RNG failed");
    u32::from_le_bytes(bytes)
}
