//! Unified error taxonomy for the sync engine.
//!
//! `Crypto` and `State` are terminal for the affected operation. `Network`
//! is transient: background loops swallow it and retry on the next tick,
//! while explicit user actions (send, create room, join room) surface it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Not authenticated: {0}")]
    Auth(String),

    #[error("Crypto failure: {0}")]
    Crypto(#[from] wsp_crypto::CryptoError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid local state: {0}")]
    State(String),

    #[error("Store error: {0}")]
    Store(#[from] wsp_store::StoreError),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

impl SyncError {
    /// Transient errors worth retrying on the next poll tick or reconnect
    /// attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::Network(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::Network(e.to_string())
    }
}
