//! REST request/response types shared with the backend.
//! These map directly to PocketBase JSON bodies on the wire.

use serde::{Deserialize, Serialize};

use crate::envelope::SealedKeyEnvelope;

// ── Auth ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Email or username; PocketBase calls this "identity".
    pub identity: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub record: UserRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// Base64 X25519 public key; absent until the user's device uploads one.
    #[serde(rename = "pubKey", default)]
    pub pub_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PubKeyPatch<'a> {
    #[serde(rename = "pubKey")]
    pub pub_key: &'a str,
}

// ── List envelope ────────────────────────────────────────────────────────────

/// PocketBase wraps every list endpoint in a page envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub page: u32,
    #[serde(rename = "perPage")]
    pub per_page: u32,
    #[serde(rename = "totalItems")]
    pub total_items: u64,
    pub items: Vec<T>,
}

// ── Room key envelopes (room_participants collection) ────────────────────────

/// Wire form of a sealed key envelope: one `room_participants` record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantRecord {
    #[serde(default)]
    pub id: String,
    pub room: String,
    pub user: String,
    #[serde(rename = "encRoomKey")]
    pub enc_room_key: EncRoomKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncRoomKey {
    pub algo: String,
    pub ciphertext: String,
}

impl ParticipantRecord {
    pub fn from_envelope(env: &SealedKeyEnvelope) -> Self {
        Self {
            id: String::new(),
            room: env.room_id.clone(),
            user: env.recipient_id.clone(),
            enc_room_key: EncRoomKey {
                algo: env.algo.clone(),
                ciphertext: env.ciphertext.clone(),
            },
        }
    }

    pub fn into_envelope(self) -> SealedKeyEnvelope {
        SealedKeyEnvelope {
            room_id: self.room,
            recipient_id: self.user,
            algo: self.enc_room_key.algo,
            ciphertext: self.enc_room_key.ciphertext,
        }
    }
}

// ── Rooms ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct NewRoomRecord<'a> {
    #[serde(rename = "type")]
    pub kind: &'a str,
    #[serde(rename = "pairKey", skip_serializing_if = "Option::is_none")]
    pub pair_key: Option<&'a str>,
    pub participants: &'a [String],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::ALGO_SEALBOX;

    #[test]
    fn participant_record_roundtrips_envelope() {
        let env = SealedKeyEnvelope {
            room_id: "r1".into(),
            recipient_id: "bob".into(),
            algo: ALGO_SEALBOX.into(),
            ciphertext: "Y3Q=".into(),
        };
        let rec = ParticipantRecord::from_envelope(&env);
        assert_eq!(rec.room, "r1");
        assert_eq!(rec.user, "bob");
        assert_eq!(rec.into_envelope(), env);
    }

    #[test]
    fn list_envelope_parses() {
        let json = r#"{"page":1,"perPage":50,"totalItems":2,"items":[
            {"id":"u1","email":null,"username":"alice","pubKey":"QQ=="},
            {"id":"u2"}
        ]}"#;
        let list: ListResponse<UserRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(list.items.len(), 2);
        assert_eq!(list.items[0].pub_key.as_deref(), Some("QQ=="));
        assert!(list.items[1].pub_key.is_none());
    }
}
