//! Engine façade wiring the components together.
//!
//! Data flow: send -> AEAD encrypt -> directory append -> merge; push and
//! poll deliveries both funnel into the same `MessageStore::merge`, so the
//! log converges no matter which channel sees a record first. Decryption
//! happens at render time and surfaces a typed error, never ciphertext.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use tokio::task::JoinHandle;

use wsp_crypto::aead;
use wsp_proto::{
    message::{Message, NewMessage, ALGO_XCHACHA20POLY1305},
    room::Room,
};
use wsp_store::KeyVault;

use crate::{
    config::Config,
    directory::Directory,
    error::SyncError,
    identity::IdentityManager,
    poll::{self, PollHandle},
    realtime::RealtimeSync,
    rooms::RoomKeyDistributor,
    session::{AuthSession, SessionHandle},
    store::MessageStore,
};

pub struct ChatEngine {
    cfg: Config,
    directory: Arc<dyn Directory>,
    session: SessionHandle,
    identity: Arc<IdentityManager>,
    rooms: RoomKeyDistributor,
    store: MessageStore,
    realtime: RealtimeSync,
}

impl ChatEngine {
    /// Build an engine around an explicit directory implementation and an
    /// opened KeyVault. Nothing global: drop the engine and everything it
    /// owns goes with it.
    pub fn new(cfg: Config, directory: Arc<dyn Directory>, vault: KeyVault) -> Self {
        let session = SessionHandle::new();
        let identity = Arc::new(IdentityManager::new(
            vault.clone(),
            directory.clone(),
            session.clone(),
        ));
        let rooms = RoomKeyDistributor::new(
            vault,
            directory.clone(),
            session.clone(),
            identity.clone(),
        );
        let realtime = RealtimeSync::new(cfg.clone(), session.clone());
        Self {
            cfg,
            directory,
            session,
            identity,
            rooms,
            store: MessageStore::new(),
            realtime,
        }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn rooms(&self) -> &RoomKeyDistributor {
        &self.rooms
    }

    pub fn realtime(&self) -> &RealtimeSync {
        &self.realtime
    }

    /// Authenticate, store the session, and make sure this device has a
    /// registered keypair.
    pub async fn login(&self, identity: &str, password: &str) -> Result<AuthSession, SyncError> {
        let session = self.directory.login(identity, password).await?;
        self.session.set(session.clone()).await;
        self.identity.ensure_identity().await?;
        Ok(session)
    }

    /// Encrypt and append one message, then merge the backend's record into
    /// the local log (the optimistic-insert path of the merge contract).
    pub async fn send_message(&self, room: &Room, plaintext: &str) -> Result<Message, SyncError> {
        let sender_id = self.session.require_user_id().await?;
        let room_key = self.rooms.ensure_room_key(room).await?;

        let (ciphertext, nonce) = aead::encrypt(&room_key, plaintext.as_bytes())?;
        let new_msg = NewMessage {
            room_id: room.id.clone(),
            sender_id,
            ciphertext: STANDARD.encode(ciphertext),
            nonce: STANDARD.encode(nonce),
            algo: ALGO_XCHACHA20POLY1305.to_string(),
        };

        let stored = self.directory.append_message(&new_msg).await?;
        self.store.merge_batch(&room.id, vec![stored.clone()]).await;

        tracing::debug!(
            target: "wsp_sync",
            event = "message_sent",
            room_id = %room.id,
            message_id = %stored.id
        );
        Ok(stored)
    }

    /// Open a room for viewing: subscribe the push channel and start the
    /// poll loop, both feeding the shared store. When the realtime channel
    /// cannot connect the view still works on polling alone; the channel's
    /// watch state tells the UI which mode it is in.
    pub async fn open_room(&self, room: &Room) -> Result<RoomView, SyncError> {
        match self.realtime.connect().await {
            Ok(()) => {}
            Err(e) => {
                tracing::warn!(
                    target: "wsp_sync",
                    event = "realtime_unavailable",
                    room_id = %room.id,
                    error = %e
                );
            }
        }

        let mut push_rx = self.realtime.subscribe(&room.id).await;
        let store = self.store.clone();
        let room_id = room.id.clone();
        let pump = tokio::spawn(async move {
            while let Some(msg) = push_rx.recv().await {
                store.merge_batch(&room_id, vec![msg]).await;
            }
        });

        let poll = poll::spawn(
            self.directory.clone(),
            self.store.clone(),
            room.id.clone(),
            self.cfg.poll_interval,
        );

        Ok(RoomView {
            room_id: room.id.clone(),
            realtime: self.realtime.clone(),
            _poll: poll,
            pump,
        })
    }

    /// Decrypt one message of `room` for display.
    pub async fn decrypt_message(&self, room: &Room, msg: &Message) -> Result<String, SyncError> {
        let room_key = self.rooms.ensure_room_key(room).await?;
        let ciphertext = STANDARD
            .decode(&msg.ciphertext)
            .map_err(wsp_crypto::CryptoError::from)?;
        let nonce = STANDARD
            .decode(&msg.nonce)
            .map_err(wsp_crypto::CryptoError::from)?;

        let plaintext = aead::decrypt(&room_key, &ciphertext, &nonce)?;
        String::from_utf8(plaintext.to_vec())
            .map_err(|_| SyncError::State(format!("message {} is not valid UTF-8", msg.id)))
    }

    /// Tear down the shared realtime connection (application shutdown, not
    /// room close).
    pub async fn shutdown(&self) {
        self.realtime.close().await;
        self.session.clear().await;
    }
}

/// Live view of one room. Dropping it cancels the poll loop and the push
/// pump; call `close()` to also send the unsubscribe directive. The
/// underlying connection is shared and stays up.
pub struct RoomView {
    room_id: String,
    realtime: RealtimeSync,
    _poll: PollHandle,
    pump: JoinHandle<()>,
}

impl RoomView {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub async fn close(self) {
        self.realtime.unsubscribe(&self.room_id).await;
        // Dropping self aborts the pump and the poll loop.
    }
}

impl Drop for RoomView {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
