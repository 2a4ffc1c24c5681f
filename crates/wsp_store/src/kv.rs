//! KeyVault: durable, access-controlled key-value storage.
//!
//! Values are AEAD-encrypted with the vault master key before they touch
//! disk; the database never holds plaintext key material. The Argon2 salt
//! lives in a separate plaintext metadata table so it can be read before
//! the vault is unlocked.
//!
//! Well-known entry names are exported as constants; per-room entries are
//! built with `room_key_name` / `room_scheme_name`.

use std::path::Path;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};

use wsp_crypto::aead;

use crate::{error::StoreError, vault::Vault};

/// AAD binding vault values to this store format.
const VAULT_AAD: &[u8] = b"wsp-vault-v1";

pub const OWN_USER_ID: &str = "own-user-id";
pub const OWN_PUBLIC_KEY: &str = "own-public-key";
pub const OWN_PRIVATE_KEY: &str = "own-private-key";

const META_SALT: &str = "vault-salt";

/// Vault entry holding the 32-byte symmetric key of one room.
pub fn room_key_name(room_id: &str) -> String {
    format!("roomkey:{room_id}")
}

/// Vault entry recording how a room's key was established
/// (`sealed` or `legacy`). See RoomKeyDistributor.
pub fn room_scheme_name(room_id: &str) -> String {
    format!("roomkey-scheme:{room_id}")
}

/// Central KeyVault handle. Cheap to clone (pool is Arc internally).
///
/// WAL journal mode is configured at connection time, not inside a
/// migration: SQLite forbids changing `journal_mode` inside a transaction
/// and sqlx wraps every migration in one.
#[derive(Clone)]
pub struct KeyVault {
    pool: SqlitePool,
    vault: Vault,
}

impl KeyVault {
    /// Open (or create) the vault database at `db_path` and run migrations.
    pub async fn open(db_path: &Path, vault: Vault) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(opts).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        tracing::debug!(target: "wsp_store", event = "keyvault_opened", path = %db_path.display());
        Ok(Self { pool, vault })
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    // ── Encrypted entries ────────────────────────────────────────────────────

    /// Store `bytes` under `name`, encrypted with the vault master key.
    pub async fn put(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let value_enc = self
            .vault
            .with_key(|key| {
                let ct = aead::encrypt_combined(key, bytes, VAULT_AAD).map_err(StoreError::Crypto)?;
                Ok(URL_SAFE_NO_PAD.encode(ct))
            })
            .await?;

        sqlx::query(
            "INSERT INTO vault_kv (name, value_enc, updated_at) VALUES (?, ?, datetime('now')) \
             ON CONFLICT(name) DO UPDATE SET value_enc = excluded.value_enc, updated_at = datetime('now')",
        )
        .bind(name)
        .bind(&value_enc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch and decrypt the entry named `name`, or None when absent.
    pub async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let row: Option<String> = sqlx::query_scalar("SELECT value_enc FROM vault_kv WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        let Some(value_enc) = row else {
            return Ok(None);
        };

        let ct = URL_SAFE_NO_PAD
            .decode(value_enc)
            .map_err(|e| StoreError::Crypto(wsp_crypto::CryptoError::Base64Decode(e)))?;

        let plaintext = self
            .vault
            .with_key(|key| {
                let pt = aead::decrypt_combined(key, &ct, VAULT_AAD).map_err(StoreError::Crypto)?;
                Ok(pt.to_vec())
            })
            .await?;
        Ok(Some(plaintext))
    }

    pub async fn delete(&self, name: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM vault_kv WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ── Plaintext metadata ───────────────────────────────────────────────────

    /// The Argon2 salt for this vault, generating and persisting one on
    /// first use. Not secret; needed before unlock.
    pub async fn salt(&self) -> Result<[u8; 16], StoreError> {
        let existing: Option<String> =
            sqlx::query_scalar("SELECT value FROM vault_meta WHERE name = ?")
                .bind(META_SALT)
                .fetch_optional(&self.pool)
                .await?;

        if let Some(hex_salt) = existing {
            let bytes = hex::decode(&hex_salt)
                .map_err(|e| StoreError::Crypto(wsp_crypto::CryptoError::HexDecode(e)))?;
            let arr: [u8; 16] = bytes
                .try_into()
                .map_err(|_| StoreError::Migration("stored vault salt is not 16 bytes".into()))?;
            return Ok(arr);
        }

        let salt = wsp_crypto::kdf::generate_salt();
        sqlx::query("INSERT INTO vault_meta (name, value) VALUES (?, ?)")
            .bind(META_SALT)
            .bind(hex::encode(salt))
            .execute(&self.pool)
            .await?;
        Ok(salt)
    }
}
