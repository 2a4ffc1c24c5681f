//! Shared session state: who is logged in, with which bearer token.
//!
//! An explicitly constructed handle, cloned into the components that need
//! it; init and teardown belong to the application lifecycle, not a static.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: String,
    pub token: String,
}

#[derive(Clone, Default)]
pub struct SessionHandle {
    inner: Arc<Mutex<Option<AuthSession>>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, session: AuthSession) {
        *self.inner.lock().await = Some(session);
    }

    pub async fn clear(&self) {
        *self.inner.lock().await = None;
    }

    pub async fn token(&self) -> Option<String> {
        self.inner.lock().await.as_ref().map(|s| s.token.clone())
    }

    pub async fn user_id(&self) -> Option<String> {
        self.inner.lock().await.as_ref().map(|s| s.user_id.clone())
    }

    /// Token or a typed `Auth` error for operations that require login.
    pub async fn require_token(&self) -> Result<String, SyncError> {
        self.token()
            .await
            .ok_or_else(|| SyncError::Auth("no active session".into()))
    }

    pub async fn require_user_id(&self) -> Result<String, SyncError> {
        self.user_id()
            .await
            .ok_or_else(|| SyncError::Auth("no active session".into()))
    }
}
