//! Encrypted message records — what the backend sees.
//!
//! The backend is a dumb record store: it only sees
//!   - id          (server-assigned, globally unique within a room)
//!   - room        (routing)
//!   - sender      (authenticated by the session token)
//!   - ciphertext  (opaque base64)
//!   - nonce       (base64, 24 bytes decoded)
//!   - algo        (cipher tag)
//!   - created     (server clock; NOT unique and NOT monotonic across senders)
//!
//! Display order is `(created, id)` ascending. `created` alone cannot order
//! the log: two senders can collide on the same timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cipher tag for message records.
pub const ALGO_XCHACHA20POLY1305: &str = "xchacha20poly1305";

/// A message record as stored by the backend. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,

    #[serde(rename = "room")]
    pub room_id: String,

    #[serde(rename = "sender")]
    pub sender_id: String,

    /// Base64 XChaCha20-Poly1305 ciphertext (tag included).
    pub ciphertext: String,

    /// Base64 24-byte nonce, stored detached from the ciphertext.
    pub nonce: String,

    pub algo: String,

    #[serde(rename = "created", with = "pb_datetime")]
    pub created_at: DateTime<Utc>,

    /// Optional reference to an uploaded attachment record.
    #[serde(rename = "attachment", default, skip_serializing_if = "Option::is_none")]
    pub attachment_ref: Option<String>,
}

impl Message {
    /// Total-order key for display: `(created_at, id)` ascending.
    pub fn sort_key(&self) -> (DateTime<Utc>, &str) {
        (self.created_at, self.id.as_str())
    }
}

/// Body for appending a new message; the backend assigns `id` and `created`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    #[serde(rename = "room")]
    pub room_id: String,

    #[serde(rename = "sender")]
    pub sender_id: String,

    pub ciphertext: String,
    pub nonce: String,
    pub algo: String,
}

/// PocketBase timestamps come back as `2024-01-02 10:20:30.123Z` (space
/// separator). Serialise as RFC 3339; accept both on the way in.
pub mod pb_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&dt.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let normalised = if s.len() > 10 && s.as_bytes()[10] == b' ' {
            let mut owned = s.clone();
            owned.replace_range(10..11, "T");
            owned
        } else {
            s
        };
        DateTime::parse_from_rfc3339(&normalised)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
