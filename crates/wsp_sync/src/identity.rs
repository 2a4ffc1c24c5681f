//! Local identity lifecycle: one keypair per device.
//!
//! The keypair is generated on first login, persisted in the KeyVault, and
//! kept until an explicit reset. The public half is uploaded to the
//! directory so peers can seal room keys for us; the private half never
//! leaves the vault.

use std::sync::Arc;

use wsp_crypto::keys::Keypair;
use wsp_store::{kv, KeyVault};

use crate::{
    directory::Directory,
    error::SyncError,
    session::SessionHandle,
};

pub struct IdentityManager {
    vault: KeyVault,
    directory: Arc<dyn Directory>,
    session: SessionHandle,
}

impl IdentityManager {
    pub fn new(vault: KeyVault, directory: Arc<dyn Directory>, session: SessionHandle) -> Self {
        Self {
            vault,
            directory,
            session,
        }
    }

    /// Load the stored keypair, or generate and persist one, and make sure
    /// the directory carries our current public key. Idempotent; call after
    /// every login.
    pub async fn ensure_identity(&self) -> Result<Keypair, SyncError> {
        let user_id = self.session.require_user_id().await?;

        let keypair = match self.vault.get(kv::OWN_PRIVATE_KEY).await? {
            Some(secret) => Keypair::from_secret_bytes(&secret)?,
            None => {
                let kp = Keypair::generate();
                self.vault.put(kv::OWN_PRIVATE_KEY, kp.secret_bytes()).await?;
                self.vault.put(kv::OWN_PUBLIC_KEY, kp.public_bytes()).await?;
                self.vault.put(kv::OWN_USER_ID, user_id.as_bytes()).await?;
                tracing::info!(target: "wsp_sync", event = "identity_generated", user_id = %user_id);
                kp
            }
        };

        let published = self.directory.fetch_public_key(&user_id).await?;
        let ours = keypair.public_b64();
        if published.as_deref() != Some(ours.as_str()) {
            self.directory.upload_public_key(&user_id, &ours).await?;
            tracing::info!(target: "wsp_sync", event = "public_key_uploaded", user_id = %user_id);
        }

        Ok(keypair)
    }

    /// The stored keypair, without touching the network. `State` error when
    /// no identity has been created on this device yet.
    pub async fn identity(&self) -> Result<Keypair, SyncError> {
        let secret = self
            .vault
            .get(kv::OWN_PRIVATE_KEY)
            .await?
            .ok_or_else(|| SyncError::State("no identity keypair on this device".into()))?;
        Ok(Keypair::from_secret_bytes(&secret)?)
    }

    /// Remove the local identity. Rooms keyed to it become unreadable until
    /// envelopes are re-issued, so this is for explicit account reset only.
    pub async fn reset(&self) -> Result<(), SyncError> {
        self.vault.delete(kv::OWN_PRIVATE_KEY).await?;
        self.vault.delete(kv::OWN_PUBLIC_KEY).await?;
        self.vault.delete(kv::OWN_USER_ID).await?;
        Ok(())
    }
}
