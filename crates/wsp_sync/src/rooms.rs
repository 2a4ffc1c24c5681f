//! Room key distribution.
//!
//! Canonical scheme: a random 32-byte key per room, sealed once per
//! participant (including self) into immutable envelopes at room creation.
//! The scheme used for each cached key is persisted (`sealed` or `legacy`);
//! the legacy deterministic derivation is reachable only for a two-party
//! room that has no envelope on the server, and a later successful envelope
//! open replaces it.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};

use wsp_crypto::{kdf, keys::PublicKeyBytes, legacy, sealed};
use wsp_proto::{
    envelope::{SealedKeyEnvelope, ALGO_SEALBOX},
    room::{pair_key, Room, RoomKind},
};
use wsp_store::{kv, KeyVault};

use crate::{directory::Directory, error::SyncError, identity::IdentityManager, session::SessionHandle};

/// How a cached room key was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScheme {
    Sealed,
    Legacy,
}

impl KeyScheme {
    fn as_str(self) -> &'static str {
        match self {
            KeyScheme::Sealed => "sealed",
            KeyScheme::Legacy => "legacy",
        }
    }

    fn parse(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"sealed" => Some(KeyScheme::Sealed),
            b"legacy" => Some(KeyScheme::Legacy),
            _ => None,
        }
    }
}

pub struct RoomKeyDistributor {
    vault: KeyVault,
    directory: Arc<dyn Directory>,
    session: SessionHandle,
    identity: Arc<IdentityManager>,
}

impl RoomKeyDistributor {
    pub fn new(
        vault: KeyVault,
        directory: Arc<dyn Directory>,
        session: SessionHandle,
        identity: Arc<IdentityManager>,
    ) -> Self {
        Self {
            vault,
            directory,
            session,
            identity,
        }
    }

    /// Create a room with a fresh random key, sealed for every participant
    /// including self.
    ///
    /// If any participant has not registered a public key yet, the whole
    /// creation fails with `NotFound` before any record is written: a room
    /// some participants could never read is worse than asking the caller
    /// to retry later.
    pub async fn create_room(&self, participant_ids: &[String]) -> Result<Room, SyncError> {
        let me = self.session.require_user_id().await?;

        let mut participants: Vec<String> = participant_ids.to_vec();
        if !participants.contains(&me) {
            participants.push(me.clone());
        }

        // Resolve every public key up front; fail before creating anything.
        let mut recipient_keys: Vec<(String, PublicKeyBytes)> = Vec::with_capacity(participants.len());
        for user_id in &participants {
            let pub_b64 = self
                .directory
                .fetch_public_key(user_id)
                .await?
                .ok_or_else(|| SyncError::NotFound(format!("public key for user {user_id}")))?;
            recipient_keys.push((user_id.clone(), PublicKeyBytes::from_b64(&pub_b64)?));
        }

        let room_key = kdf::generate_room_key();

        let kind = if participants.len() == 2 {
            RoomKind::Direct
        } else {
            RoomKind::Group
        };
        let pair = if kind == RoomKind::Direct {
            let peer = participants.iter().find(|p| **p != me).cloned().unwrap_or_default();
            Some(pair_key(&me, &peer))
        } else {
            None
        };

        let room = self
            .directory
            .create_room(kind, pair.as_deref(), &participants)
            .await?;

        for (user_id, pub_key) in &recipient_keys {
            let ct = sealed::seal(&room_key, &pub_key.0)?;
            let envelope = SealedKeyEnvelope {
                room_id: room.id.clone(),
                recipient_id: user_id.clone(),
                algo: ALGO_SEALBOX.to_string(),
                ciphertext: STANDARD.encode(&ct),
            };
            self.directory.upload_envelope(&envelope).await?;
        }

        self.cache_key(&room.id, &room_key, KeyScheme::Sealed).await?;
        tracing::info!(
            target: "wsp_sync",
            event = "room_created",
            room_id = %room.id,
            participants = participants.len()
        );
        Ok(room)
    }

    /// Direct room with `peer`: reuse the room with the deterministic pair
    /// key when one exists, otherwise create it (with envelopes).
    pub async fn open_or_create_direct(&self, peer_id: &str) -> Result<Room, SyncError> {
        let me = self.session.require_user_id().await?;
        let key = pair_key(&me, peer_id);

        if let Some(room) = self.directory.find_room_by_pair_key(&key).await? {
            return Ok(room);
        }
        self.create_room(&[me, peer_id.to_string()]).await
    }

    /// Fetch our own envelope for `room_id`, open it, and cache the key.
    pub async fn join_room(&self, room_id: &str) -> Result<(), SyncError> {
        let me = self.session.require_user_id().await?;

        let envelope = self
            .directory
            .fetch_envelope(room_id, &me)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("envelope for room {room_id}")))?;

        let keypair = self.identity.identity().await?;
        let ct = STANDARD.decode(&envelope.ciphertext).map_err(wsp_crypto::CryptoError::from)?;
        let room_key = sealed::open(&ct, keypair.public_bytes(), keypair.secret_bytes())?;

        self.cache_key(room_id, &room_key, KeyScheme::Sealed).await?;
        tracing::info!(target: "wsp_sync", event = "room_joined", room_id = %room_id);
        Ok(())
    }

    /// The cached key for `room_id`, if any.
    pub async fn cached_key(&self, room_id: &str) -> Result<Option<[u8; 32]>, SyncError> {
        let Some(bytes) = self.vault.get(&kv::room_key_name(room_id)).await? else {
            return Ok(None);
        };
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            SyncError::State(format!("cached key for room {room_id} is not 32 bytes"))
        })?;
        Ok(Some(arr))
    }

    /// The persisted scheme marker for `room_id`.
    pub async fn key_scheme(&self, room_id: &str) -> Result<Option<KeyScheme>, SyncError> {
        Ok(self
            .vault
            .get(&kv::room_scheme_name(room_id))
            .await?
            .and_then(|b| KeyScheme::parse(&b)))
    }

    /// Resolve the key for `room`, in order:
    ///   1. vault cache (a sealed key is final; a legacy key is provisional)
    ///   2. our envelope on the server
    ///   3. for a two-party room with no envelope at all: the legacy
    ///      deterministic derivation, cached and marked `legacy`
    pub async fn ensure_room_key(&self, room: &Room) -> Result<[u8; 32], SyncError> {
        if let Some(key) = self.cached_key(&room.id).await? {
            match self.key_scheme(&room.id).await? {
                Some(KeyScheme::Legacy) => {
                    // A distributed key supersedes the legacy one as soon as
                    // an envelope shows up.
                    if self.join_room(&room.id).await.is_ok() {
                        if let Some(upgraded) = self.cached_key(&room.id).await? {
                            return Ok(upgraded);
                        }
                    }
                    return Ok(key);
                }
                _ => return Ok(key),
            }
        }

        match self.join_room(&room.id).await {
            Ok(()) => {}
            Err(SyncError::NotFound(_)) if room.is_direct() && room.participants.len() == 2 => {
                let me = self.session.require_user_id().await?;
                let peer = room
                    .participants
                    .iter()
                    .find(|p| **p != me)
                    .ok_or_else(|| SyncError::State("direct room without a peer".into()))?;
                let key = legacy::derive_room_key(&me, peer);
                self.cache_key(&room.id, &key, KeyScheme::Legacy).await?;
                tracing::warn!(
                    target: "wsp_sync",
                    event = "legacy_room_key",
                    room_id = %room.id,
                    "no distributed key for two-party room; using legacy derivation"
                );
                return Ok(key);
            }
            Err(e) => return Err(e),
        }

        self.cached_key(&room.id)
            .await?
            .ok_or_else(|| SyncError::State(format!("no key available for room {}", room.id)))
    }

    async fn cache_key(
        &self,
        room_id: &str,
        key: &[u8; 32],
        scheme: KeyScheme,
    ) -> Result<(), SyncError> {
        self.vault.put(&kv::room_key_name(room_id), key).await?;
        self.vault
            .put(&kv::room_scheme_name(room_id), scheme.as_str().as_bytes())
            .await?;
        Ok(())
    }
}
