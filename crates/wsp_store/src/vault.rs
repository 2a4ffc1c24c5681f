//! Vault: in-memory master key material.
//!
//! Holds the 32-byte key that encrypts KeyVault values at rest. Locking the
//! vault zeroizes the key from memory. Reads share the lock: concurrent
//! decryptions across rooms are never serialised behind each other, and an
//! occasional write (caching one new room key) takes the write half only
//! briefly.

use std::sync::Arc;
use tokio::sync::RwLock;
use zeroize::ZeroizeOnDrop;

use wsp_crypto::kdf::vault_key_from_password;

use crate::error::StoreError;

#[derive(ZeroizeOnDrop)]
struct VaultInner {
    key: [u8; 32],
}

/// Thread-safe vault handle. Clone to share across components.
#[derive(Clone)]
pub struct Vault {
    inner: Arc<RwLock<Option<VaultInner>>>,
}

impl Vault {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
        }
    }

    /// Unlock the vault with the given password and salt.
    /// Call on successful login before any KeyVault read/write.
    pub async fn unlock(&self, password: &[u8], salt: &[u8; 16]) -> Result<(), StoreError> {
        let vault_key = vault_key_from_password(password, salt)?;
        let mut guard = self.inner.write().await;
        *guard = Some(VaultInner { key: vault_key.0 });
        Ok(())
    }

    /// Unlock with an existing key (e.g. from an OS keystore).
    pub async fn unlock_with_key(&self, key: [u8; 32]) {
        let mut guard = self.inner.write().await;
        *guard = Some(VaultInner { key });
    }

    /// Lock the vault; zeroizes the key.
    pub async fn lock(&self) {
        let mut guard = self.inner.write().await;
        *guard = None;
    }

    pub async fn is_locked(&self) -> bool {
        self.inner.read().await.is_none()
    }

    /// Run `f` with the raw key. Errs if the vault is locked. Takes the
    /// read half, so parallel callers do not block one another.
    pub async fn with_key<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&[u8; 32]) -> Result<R, StoreError>,
    {
        let guard = self.inner.read().await;
        match guard.as_ref() {
            Some(inner) => f(&inner.key),
            None => Err(StoreError::VaultLocked),
        }
    }
}

impl Default for Vault {
    fn default() -> Self {
        Self::new()
    }
}
