//! Deterministic two-party room key (demo-era fallback).
//!
//! Derives a 32-byte key from the sorted pair of user ids plus a fixed
//! salt. Anyone who knows both ids can compute it, so this provides no
//! real secrecy. It exists only so a two-party room with no distributed
//! key yet remains readable, and a sealed-box key supersedes it as soon
//! as one is available. Callers must persist which scheme a room uses.

use sha2::{Digest, Sha256};

use crate::ROOM_KEY_LEN;

const LEGACY_SALT: &str = "whisper-v0-roomkey";

/// Derive the legacy room key for a two-party room. Symmetric in argument
/// order: both participants compute the same key.
pub fn derive_room_key(me: &str, peer: &str) -> [u8; ROOM_KEY_LEN] {
    let ids = if me < peer {
        format!("{me}:{peer}")
    } else {
        format!("{peer}:{me}")
    };
    let digest = Sha256::digest(format!("{ids}|{LEGACY_SALT}").as_bytes());
    let mut key = [0u8; ROOM_KEY_LEN];
    key.copy_from_slice(&digest);
    key
}
