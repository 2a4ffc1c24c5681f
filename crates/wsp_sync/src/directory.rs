//! Directory service abstraction.
//!
//! The backend is modelled as a trait with exactly the operations the sync
//! core needs: session login, public-key lookup/upload, room lookup and
//! creation, message list/append, and sealed-envelope upload/fetch. One
//! production implementation talks PocketBase REST; tests provide an
//! in-memory fake.

use async_trait::async_trait;
use reqwest::StatusCode;

use wsp_proto::{
    api::{
        AuthRequest, AuthResponse, ListResponse, NewRoomRecord, ParticipantRecord, PubKeyPatch,
        UserRecord,
    },
    envelope::SealedKeyEnvelope,
    message::{Message, NewMessage},
    room::{Room, RoomKind},
};

use crate::{
    error::SyncError,
    session::{AuthSession, SessionHandle},
};

#[async_trait]
pub trait Directory: Send + Sync {
    /// Authenticate and return the session. Does not mutate any shared
    /// state; callers store the result in their `SessionHandle`.
    async fn login(&self, identity: &str, password: &str) -> Result<AuthSession, SyncError>;

    /// A user's published public key (base64), or None when the user has
    /// not registered one yet.
    async fn fetch_public_key(&self, user_id: &str) -> Result<Option<String>, SyncError>;

    /// Publish our public key on the user record.
    async fn upload_public_key(&self, user_id: &str, pub_key_b64: &str) -> Result<(), SyncError>;

    /// Direct-room lookup by deterministic pair key.
    async fn find_room_by_pair_key(&self, pair_key: &str) -> Result<Option<Room>, SyncError>;

    async fn create_room(
        &self,
        kind: RoomKind,
        pair_key: Option<&str>,
        participants: &[String],
    ) -> Result<Room, SyncError>;

    /// Full message list of one room, backend order (by `created`).
    async fn list_messages(&self, room_id: &str) -> Result<Vec<Message>, SyncError>;

    /// Append a message; the backend assigns `id` and `created` and returns
    /// the complete record.
    async fn append_message(&self, msg: &NewMessage) -> Result<Message, SyncError>;

    async fn upload_envelope(&self, env: &SealedKeyEnvelope) -> Result<(), SyncError>;

    /// The envelope sealed for `recipient_id` in `room_id`, if any.
    async fn fetch_envelope(
        &self,
        room_id: &str,
        recipient_id: &str,
    ) -> Result<Option<SealedKeyEnvelope>, SyncError>;
}

// ── PocketBase implementation ────────────────────────────────────────────────

pub struct PocketBaseDirectory {
    http: reqwest::Client,
    base_url: String,
    session: SessionHandle,
}

impl PocketBaseDirectory {
    pub fn new(base_url: impl Into<String>, session: SessionHandle) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn bearer(&self) -> Result<String, SyncError> {
        self.session.require_token().await
    }

    /// Map a non-success response to the error taxonomy.
    async fn fail(resp: reqwest::Response, what: &str) -> SyncError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                SyncError::Auth(format!("{what} rejected ({status})"))
            }
            StatusCode::NOT_FOUND => SyncError::NotFound(format!("{what} ({status})")),
            _ => SyncError::Network(format!("{what} failed ({status}): {body}")),
        }
    }
}

#[async_trait]
impl Directory for PocketBaseDirectory {
    async fn login(&self, identity: &str, password: &str) -> Result<AuthSession, SyncError> {
        let resp = self
            .http
            .post(self.url("/api/collections/users/auth-with-password"))
            .json(&AuthRequest {
                identity: identity.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp, "login").await);
        }
        let body: AuthResponse = resp.json().await?;
        Ok(AuthSession {
            user_id: body.record.id,
            token: body.token,
        })
    }

    async fn fetch_public_key(&self, user_id: &str) -> Result<Option<String>, SyncError> {
        let token = self.bearer().await?;
        let resp = self
            .http
            .get(self.url(&format!("/api/collections/users/records/{user_id}")))
            .bearer_auth(&token)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound(format!("user {user_id}")));
        }
        if !resp.status().is_success() {
            return Err(Self::fail(resp, "fetch public key").await);
        }
        let record: UserRecord = resp.json().await?;
        Ok(record.pub_key.filter(|k| !k.is_empty()))
    }

    async fn upload_public_key(&self, user_id: &str, pub_key_b64: &str) -> Result<(), SyncError> {
        let token = self.bearer().await?;
        let resp = self
            .http
            .patch(self.url(&format!("/api/collections/users/records/{user_id}")))
            .bearer_auth(&token)
            .json(&PubKeyPatch {
                pub_key: pub_key_b64,
            })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp, "upload public key").await);
        }
        Ok(())
    }

    async fn find_room_by_pair_key(&self, pair_key: &str) -> Result<Option<Room>, SyncError> {
        let token = self.bearer().await?;
        let resp = self
            .http
            .get(self.url("/api/collections/chat_rooms/records"))
            .bearer_auth(&token)
            .query(&[("filter", format!("pairKey=\"{pair_key}\"")), ("perPage", "1".into())])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp, "find room").await);
        }
        let list: ListResponse<Room> = resp.json().await?;
        Ok(list.items.into_iter().next())
    }

    async fn create_room(
        &self,
        kind: RoomKind,
        pair_key: Option<&str>,
        participants: &[String],
    ) -> Result<Room, SyncError> {
        let token = self.bearer().await?;
        let kind_str = match kind {
            RoomKind::Direct => "direct",
            RoomKind::Group => "group",
        };
        let resp = self
            .http
            .post(self.url("/api/collections/chat_rooms/records"))
            .bearer_auth(&token)
            .json(&NewRoomRecord {
                kind: kind_str,
                pair_key,
                participants,
            })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp, "create room").await);
        }
        Ok(resp.json().await?)
    }

    async fn list_messages(&self, room_id: &str) -> Result<Vec<Message>, SyncError> {
        let token = self.bearer().await?;
        let resp = self
            .http
            .get(self.url("/api/collections/messages/records"))
            .bearer_auth(&token)
            .query(&[
                ("filter", format!("room=\"{room_id}\"")),
                ("sort", "created".into()),
                ("perPage", "200".into()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp, "list messages").await);
        }
        let list: ListResponse<Message> = resp.json().await?;
        Ok(list.items)
    }

    async fn append_message(&self, msg: &NewMessage) -> Result<Message, SyncError> {
        let token = self.bearer().await?;
        let resp = self
            .http
            .post(self.url("/api/collections/messages/records"))
            .bearer_auth(&token)
            .json(msg)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp, "append message").await);
        }
        Ok(resp.json().await?)
    }

    async fn upload_envelope(&self, env: &SealedKeyEnvelope) -> Result<(), SyncError> {
        let token = self.bearer().await?;
        let resp = self
            .http
            .post(self.url("/api/collections/room_participants/records"))
            .bearer_auth(&token)
            .json(&ParticipantRecord::from_envelope(env))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp, "upload envelope").await);
        }
        Ok(())
    }

    async fn fetch_envelope(
        &self,
        room_id: &str,
        recipient_id: &str,
    ) -> Result<Option<SealedKeyEnvelope>, SyncError> {
        let token = self.bearer().await?;
        let resp = self
            .http
            .get(self.url("/api/collections/room_participants/records"))
            .bearer_auth(&token)
            .query(&[
                (
                    "filter",
                    format!("room=\"{room_id}\" && user=\"{recipient_id}\""),
                ),
                ("perPage", "1".into()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp, "fetch envelope").await);
        }
        let list: ListResponse<ParticipantRecord> = resp.json().await?;
        Ok(list.items.into_iter().next().map(|r| r.into_envelope()))
    }
}
