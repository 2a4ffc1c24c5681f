//! Sealed room-key envelopes.
//!
//! One envelope per (room, participant), written once at room creation and
//! immutable afterwards. The backend stores it as an opaque blob; only the
//! recipient's secret key can open the ciphertext.

use serde::{Deserialize, Serialize};

/// Algorithm tag for sealed-box envelopes.
pub const ALGO_SEALBOX: &str = "sealbox";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedKeyEnvelope {
    pub room_id: String,
    pub recipient_id: String,
    pub algo: String,
    /// Base64 `[ephemeral pub (32) | wrapped key + tag]`.
    pub ciphertext: String,
}
