//! In-memory Directory fake for engine tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};

use wsp_proto::{
    envelope::SealedKeyEnvelope,
    message::{Message, NewMessage},
    room::{Room, RoomKind},
};
use wsp_sync::{
    directory::Directory,
    error::SyncError,
    session::AuthSession,
};

struct User {
    password: String,
    user_id: String,
}

#[derive(Default)]
struct State {
    users: HashMap<String, User>,
    pub_keys: HashMap<String, String>,
    rooms: Vec<Room>,
    messages: HashMap<String, Vec<Message>>,
    envelopes: HashMap<(String, String), SealedKeyEnvelope>,
    next_id: u64,
}

#[derive(Default)]
pub struct InMemoryDirectory {
    state: Mutex<State>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_user(&self, identity: &str, password: &str, user_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.users.insert(
            identity.to_string(),
            User {
                password: password.to_string(),
                user_id: user_id.to_string(),
            },
        );
    }

    /// Insert a room record directly, bypassing key distribution (models a
    /// room created by an old client that never uploaded envelopes).
    pub fn insert_bare_room(&self, room: Room) {
        self.state.lock().unwrap().rooms.push(room);
    }

    pub fn room_count(&self) -> usize {
        self.state.lock().unwrap().rooms.len()
    }

    /// Raw server-side view of a room's records.
    pub fn list_messages_for_test(&self, room_id: &str) -> Vec<Message> {
        self.state
            .lock()
            .unwrap()
            .messages
            .get(room_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn envelope_count(&self, room_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .envelopes
            .keys()
            .filter(|(r, _)| r == room_id)
            .count()
    }

    fn fresh_id(state: &mut State, prefix: &str) -> String {
        state.next_id += 1;
        format!("{prefix}{}", state.next_id)
    }

    fn created_at(state: &State) -> chrono::DateTime<Utc> {
        // Strictly increasing server clock, one second per record.
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(state.next_id as i64)
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn login(&self, identity: &str, password: &str) -> Result<AuthSession, SyncError> {
        let state = self.state.lock().unwrap();
        let user = state
            .users
            .get(identity)
            .filter(|u| u.password == password)
            .ok_or_else(|| SyncError::Auth("bad credentials".into()))?;
        Ok(AuthSession {
            user_id: user.user_id.clone(),
            token: format!("tok-{}", user.user_id),
        })
    }

    async fn fetch_public_key(&self, user_id: &str) -> Result<Option<String>, SyncError> {
        let state = self.state.lock().unwrap();
        if !state.users.values().any(|u| u.user_id == user_id) {
            return Err(SyncError::NotFound(format!("user {user_id}")));
        }
        Ok(state.pub_keys.get(user_id).cloned())
    }

    async fn upload_public_key(&self, user_id: &str, pub_key_b64: &str) -> Result<(), SyncError> {
        self.state
            .lock()
            .unwrap()
            .pub_keys
            .insert(user_id.to_string(), pub_key_b64.to_string());
        Ok(())
    }

    async fn find_room_by_pair_key(&self, pair_key: &str) -> Result<Option<Room>, SyncError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .rooms
            .iter()
            .find(|r| r.pair_key.as_deref() == Some(pair_key))
            .cloned())
    }

    async fn create_room(
        &self,
        kind: RoomKind,
        pair_key: Option<&str>,
        participants: &[String],
    ) -> Result<Room, SyncError> {
        let mut state = self.state.lock().unwrap();
        let created_at = Self::created_at(&state);
        let id = Self::fresh_id(&mut state, "room-");
        let room = Room {
            id,
            kind,
            pair_key: pair_key.map(str::to_string),
            participants: participants.to_vec(),
            created_at,
        };
        state.rooms.push(room.clone());
        Ok(room)
    }

    async fn list_messages(&self, room_id: &str) -> Result<Vec<Message>, SyncError> {
        let state = self.state.lock().unwrap();
        Ok(state.messages.get(room_id).cloned().unwrap_or_default())
    }

    async fn append_message(&self, msg: &NewMessage) -> Result<Message, SyncError> {
        let mut state = self.state.lock().unwrap();
        let created_at = Self::created_at(&state);
        let id = Self::fresh_id(&mut state, "msg-");
        let stored = Message {
            id,
            room_id: msg.room_id.clone(),
            sender_id: msg.sender_id.clone(),
            ciphertext: msg.ciphertext.clone(),
            nonce: msg.nonce.clone(),
            algo: msg.algo.clone(),
            created_at,
            attachment_ref: None,
        };
        state
            .messages
            .entry(msg.room_id.clone())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn upload_envelope(&self, env: &SealedKeyEnvelope) -> Result<(), SyncError> {
        self.state.lock().unwrap().envelopes.insert(
            (env.room_id.clone(), env.recipient_id.clone()),
            env.clone(),
        );
        Ok(())
    }

    async fn fetch_envelope(
        &self,
        room_id: &str,
        recipient_id: &str,
    ) -> Result<Option<SealedKeyEnvelope>, SyncError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .envelopes
            .get(&(room_id.to_string(), recipient_id.to_string()))
            .cloned())
    }
}
